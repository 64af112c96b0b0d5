use super::resolve_channels;
use crate::core::{ChannelDataSource, ChannelId, Processor, ScopeDataCollection, SharedRegistry};
use anyhow::Result;
use std::collections::HashMap;

/// Flips the polarity of selected analog channels by overriding their
/// viewport and acquisition data
pub struct InvertProcessor {
    channels: Vec<ChannelId>,
    /// Version of the array this processor last wrote per key
    written: HashMap<(ChannelDataSource, ChannelId), u64>,
}

impl InvertProcessor {
    pub fn new(registry: &SharedRegistry, names: &[String]) -> Result<Self> {
        Ok(Self {
            channels: resolve_channels(registry, names)?,
            written: HashMap::new(),
        })
    }
}

impl Processor for InvertProcessor {
    fn name(&self) -> &str {
        "invert"
    }

    fn process(&mut self, collection: &ScopeDataCollection) -> Result<()> {
        for &channel in &self.channels {
            for source in [ChannelDataSource::Viewport, ChannelDataSource::Acquisition] {
                let Some(data) = collection.get_data(source, channel) else {
                    continue;
                };
                // Already our output: inverting again would undo it
                if self.written.get(&(source, channel)) == Some(&data.version()) {
                    continue;
                }
                let Some(samples) = data.array.as_float() else {
                    continue;
                };

                let inverted: Vec<f64> = samples.iter().map(|v| -v).collect();
                let written = collection.override_data(&data, inverted)?;
                self.written.insert((source, channel), written.version());
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.written.clear();
    }
}
