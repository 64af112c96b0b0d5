use crate::core::{ChannelId, Processor, ProcessorStage, ScopeDataCollection};
use crate::observability::ProcessorMetrics;
use anyhow::Result;
use log::warn;
use serde_json::Value;
use std::sync::Arc;

/// Wraps a processor so its failures stay local: errors are counted,
/// logged and swallowed, and the pass carries on with the next processor.
pub struct GuardedProcessor {
    inner: Box<dyn Processor>,
    metrics: Arc<ProcessorMetrics>,
}

impl GuardedProcessor {
    pub fn new(inner: Box<dyn Processor>, metrics: Arc<ProcessorMetrics>) -> Self {
        Self { inner, metrics }
    }

    pub fn metrics(&self) -> &Arc<ProcessorMetrics> {
        &self.metrics
    }
}

impl Processor for GuardedProcessor {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn stage(&self) -> ProcessorStage {
        self.inner.stage()
    }

    fn configure(&mut self, config: &Value) -> Result<()> {
        self.inner.configure(config)
    }

    fn process(&mut self, collection: &ScopeDataCollection) -> Result<()> {
        let start = self.metrics.start_processing();
        let result = self.inner.process(collection);
        self.metrics.finish_processing(start);

        match result {
            Ok(()) => self.metrics.record_pass(),
            Err(e) => {
                self.metrics.record_failure();
                warn!("{} failed on collection {}: {:#}", self.inner.name(), collection.id(), e);
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.inner.reset()
    }

    fn output_channels(&self) -> Vec<ChannelId> {
        self.inner.output_channels()
    }
}
