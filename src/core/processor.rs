use super::channel::ChannelId;
use super::collection::ScopeDataCollection;
use anyhow::Result;
use serde_json::Value;

/// Scheduling class of a simple processor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorStage {
    /// Runs before everything else so it sees untouched analog data
    Fft,
    /// Runs in registration order after the FFT stage
    Simple,
}

/// Base trait for all simple processors run once per acquisition.
///
/// The pipeline calls every processor on every acquisition, so each
/// implementation must detect on its own whether its input changed and
/// return early when it did not.
pub trait Processor: Send {
    fn name(&self) -> &str;

    fn stage(&self) -> ProcessorStage {
        ProcessorStage::Simple
    }

    /// Called once when the processor is added, with its JSON config
    fn configure(&mut self, _config: &Value) -> Result<()> {
        Ok(())
    }

    /// Transform the collection in place through its set/override accessors
    fn process(&mut self, collection: &ScopeDataCollection) -> Result<()>;

    /// Drop any cross-acquisition history
    fn reset(&mut self) {}

    /// Derived channels this processor writes
    fn output_channels(&self) -> Vec<ChannelId> {
        Vec::new()
    }
}
