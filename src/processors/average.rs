use crate::core::channel::read_registry;
use crate::core::{
    ChannelArray, ChannelDataSource, ChannelId, ChannelKind, Processor, ScopeDataCollection,
};
use anyhow::Result;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

#[derive(Default)]
struct History {
    captures: VecDeque<Arc<[f64]>>,
    /// Update timestamp of the capture at the back of the queue
    last_timestamp: Option<u64>,
}

/// Running mean over the last `depth` viewport captures of every analog
/// channel
pub struct AverageProcessor {
    depth: usize,
    history: HashMap<ChannelId, History>,
    last_collection: Option<u64>,
}

impl AverageProcessor {
    pub fn new(depth: usize) -> Self {
        Self {
            depth: depth.max(1),
            history: HashMap::new(),
            last_collection: None,
        }
    }
}

impl Processor for AverageProcessor {
    fn name(&self) -> &str {
        "average"
    }

    fn process(&mut self, collection: &ScopeDataCollection) -> Result<()> {
        if self.depth < 2 || self.last_collection == Some(collection.id()) {
            return Ok(());
        }
        self.last_collection = Some(collection.id());

        let analog = read_registry(collection.registry()).of_kind(ChannelKind::Analog);
        for channel in analog {
            let Some(data) = collection.get_data(ChannelDataSource::Viewport, channel) else {
                continue;
            };
            let ChannelArray::Float(samples) = &data.array else {
                continue;
            };

            let history = self.history.entry(channel).or_default();

            // A forced reprocess delivers the same capture again
            if history.last_timestamp == Some(collection.update_timestamp()) {
                history.captures.pop_back();
            }
            if history
                .captures
                .front()
                .map(|c| c.len() != samples.len())
                .unwrap_or(false)
            {
                history.captures.clear();
            }
            history.captures.push_back(Arc::clone(samples));
            while history.captures.len() > self.depth {
                history.captures.pop_front();
            }

            let count = history.captures.len() as f64;
            let mut sum = vec![0.0; samples.len()];
            for capture in &history.captures {
                for (acc, v) in sum.iter_mut().zip(capture.iter()) {
                    *acc += v;
                }
            }
            let average = ChannelArray::from(sum.into_iter().map(|v| v / count).collect::<Vec<_>>());

            collection.override_data(&data, average)?;
            history.last_timestamp = Some(collection.update_timestamp());
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.history.clear();
        self.last_collection = None;
    }
}
