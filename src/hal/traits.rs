use crate::core::RawAcquisition;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Lifecycle of an acquisition source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceState {
    Unopened,
    Opened,
    Running,
    Stopped,
    Closed,
    Error(String),
}

/// Device layer delivering raw captures, one at a time
#[async_trait]
pub trait AcquisitionSource: Send {
    fn name(&self) -> &str;

    /// Apply settings; only valid before `open`
    async fn configure(&mut self, config: Value) -> Result<()>;

    async fn open(&mut self) -> Result<()>;

    async fn start(&mut self) -> Result<()>;

    /// Wait for the next capture. `None` once the source is exhausted.
    async fn read_acquisition(&mut self) -> Result<Option<RawAcquisition>>;

    async fn stop(&mut self) -> Result<()>;

    async fn close(&mut self) -> Result<()>;

    fn state(&self) -> SourceState;
}
