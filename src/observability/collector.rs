use super::ProcessorMetrics;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub processor_id: String,
    pub passes: u64,
    pub failures: u64,
    pub avg_latency_us: u64,
}

/// Registry of every processor's counters, keyed by pipeline slot name
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector {
    metrics: BTreeMap<String, Arc<ProcessorMetrics>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, key: impl Into<String>, metrics: Arc<ProcessorMetrics>) {
        self.metrics.insert(key.into(), metrics);
    }

    pub fn unregister(&mut self, key: &str) -> Option<Arc<ProcessorMetrics>> {
        self.metrics.remove(key)
    }

    pub fn snapshot(&self) -> BTreeMap<String, MetricsSnapshot> {
        self.metrics
            .iter()
            .map(|(key, metrics)| {
                (
                    key.clone(),
                    MetricsSnapshot {
                        processor_id: metrics.processor_id().to_string(),
                        passes: metrics.passes(),
                        failures: metrics.failures(),
                        avg_latency_us: metrics.avg_latency_us(),
                    },
                )
            })
            .collect()
    }

    pub fn get(&self, key: &str) -> Option<Arc<ProcessorMetrics>> {
        self.metrics.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}
