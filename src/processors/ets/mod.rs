//! Equivalent-time sampling.
//!
//! When the viewport holds far fewer samples than are useful on screen, the
//! engine keeps a short per-channel history of near-identical captures and
//! interleaves them, placing each capture's samples by its sub-sample
//! trigger adjustment. The result is stored under the two ETS sources: the
//! interleaved voltages and one timestamp per voltage.

pub mod difference;
pub mod smoothing;

pub use difference::DifferenceDetector;
pub use smoothing::smooth_in_place;

use crate::config::EtsConfig;
use crate::core::channel::read_registry;
use crate::core::{
    ChannelArray, ChannelData, ChannelDataSource, ChannelId, ChannelKind, ChannelResolution, Processor,
    ScopeBuffer, ScopeDataCollection,
};
use anyhow::Result;
use log::{debug, error};
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// ETS state readable from other threads
#[derive(Debug, Default)]
pub struct EtsStatus {
    candidate: AtomicBool,
    effective: AtomicBool,
    boost: AtomicUsize,
    equivalent_rate_bits: AtomicU64,
    reset_requested: AtomicBool,
}

impl EtsStatus {
    /// Conditions for ETS hold for the latest acquisition
    pub fn candidate(&self) -> bool {
        self.candidate.load(Ordering::Acquire)
    }

    /// At least one channel interleaved more than one capture
    pub fn effective(&self) -> bool {
        self.effective.load(Ordering::Acquire)
    }

    pub fn boost(&self) -> usize {
        self.boost.load(Ordering::Acquire)
    }

    /// Samples per second after interleaving; 0.0 when not a candidate
    pub fn equivalent_sampling_rate(&self) -> f64 {
        f64::from_bits(self.equivalent_rate_bits.load(Ordering::Acquire))
    }

    /// Drop every queue before the next acquisition is interleaved
    pub fn request_reset(&self) {
        self.reset_requested.store(true, Ordering::Release);
    }

    fn publish(&self, candidate: bool, effective: bool, boost: usize, rate: f64) {
        self.boost.store(boost, Ordering::Release);
        self.equivalent_rate_bits.store(rate.to_bits(), Ordering::Release);
        self.candidate.store(candidate, Ordering::Release);
        self.effective.store(effective, Ordering::Release);
    }
}

/// What the engine keeps of one capture for one channel
#[derive(Debug, Clone)]
struct EtsCapture {
    update_timestamp: u64,
    samples: Arc<[f64]>,
    acquisition_samples: usize,
    resolution: Option<ChannelResolution>,
    sample_period: f64,
    time_offset: f64,
    holdoff_samples: i64,
    holdoff: f64,
    trigger_adjustment: f64,
}

impl EtsCapture {
    fn new(collection: &ScopeDataCollection, data: &ChannelData, samples: Arc<[f64]>) -> Self {
        let raw = collection.raw();
        Self {
            update_timestamp: raw.update_timestamp,
            samples,
            acquisition_samples: raw.acquisition_samples,
            resolution: raw.resolution(data.channel),
            sample_period: data.sample_period,
            time_offset: data.time_offset,
            holdoff_samples: raw.holdoff_samples,
            holdoff: raw.holdoff,
            trigger_adjustment: collection.trigger_adjustment(),
        }
    }

    /// Sample position of index 0 relative to the trigger sample
    fn start_offset(&self) -> i64 {
        let viewport_offset = if self.sample_period > 0.0 {
            (self.time_offset / self.sample_period).round() as i64
        } else {
            0
        };
        viewport_offset - self.holdoff_samples
    }

    fn similar_to(&self, other: &EtsCapture) -> bool {
        let len = self.samples.len() as i64;
        self.samples.len() == other.samples.len()
            && self.resolution == other.resolution
            && self.time_offset == other.time_offset
            && (self.holdoff_samples - other.holdoff_samples).abs() < len
    }
}

pub struct EtsEngine {
    config: EtsConfig,
    queues: BTreeMap<ChannelId, VecDeque<EtsCapture>>,
    detector: DifferenceDetector,
    status: Arc<EtsStatus>,
    last_collection: Option<u64>,
}

impl EtsEngine {
    pub fn new(config: EtsConfig) -> Self {
        let detector = DifferenceDetector::new(config.change_threshold);
        Self {
            config,
            queues: BTreeMap::new(),
            detector,
            status: Arc::new(EtsStatus::default()),
            last_collection: None,
        }
    }

    pub fn status(&self) -> Arc<EtsStatus> {
        Arc::clone(&self.status)
    }

    /// Treat `channel` as significantly changed on its next capture
    pub fn flag_changed(&mut self, channel: ChannelId) {
        self.detector.flag(channel);
    }

    pub fn queue_len(&self, channel: ChannelId) -> usize {
        self.queues.get(&channel).map(|q| q.len()).unwrap_or(0)
    }

    /// Boost factor for this acquisition if ETS applies to it
    fn eligibility(&self, collection: &ScopeDataCollection) -> Option<(usize, f64)> {
        let raw = collection.raw();
        let viewport = raw.buffer(ScopeBuffer::Viewport)?;
        let acquisition_period = raw.sample_period(ScopeBuffer::Acquisition)?;
        if viewport.sample_period != acquisition_period || viewport.sample_period <= 0.0 {
            return None;
        }

        let samples = viewport.sample_count();
        if samples == 0 {
            return None;
        }
        let boost = (self.config.min_viewport_samples as f64 / samples as f64).round() as usize;
        if boost < 2 || !self.config.enabled {
            return None;
        }
        Some((boost, viewport.sample_period))
    }

    fn update_queues(&mut self, collection: &ScopeDataCollection) {
        let enabled: Vec<ChannelId> = {
            let registry = read_registry(collection.registry());
            collection
                .raw()
                .buffer(ScopeBuffer::Viewport)
                .map(|b| {
                    b.channels()
                        .filter(|ch| {
                            registry
                                .get(*ch)
                                .map(|c| c.kind == ChannelKind::Analog)
                                .unwrap_or(false)
                        })
                        .collect()
                })
                .unwrap_or_default()
        };

        let stale: Vec<ChannelId> = self
            .queues
            .keys()
            .filter(|ch| !enabled.contains(ch))
            .copied()
            .collect();
        for ch in stale {
            self.queues.remove(&ch);
            self.detector.forget(ch);
        }
        for ch in enabled {
            self.queues.entry(ch).or_default();
        }

        if self.status.reset_requested.swap(false, Ordering::AcqRel) {
            for queue in self.queues.values_mut() {
                queue.clear();
            }
        }
    }

    fn run_ets(&mut self, collection: &ScopeDataCollection, channel: ChannelId, boost: usize) -> Result<()> {
        let Some(data) = collection.get_best_data(channel) else {
            return Ok(());
        };
        let ChannelArray::Float(samples) = &data.array else {
            return Ok(());
        };
        let capture = EtsCapture::new(collection, &data, Arc::clone(samples));
        let changed = self
            .detector
            .check(channel, &capture.samples, capture.resolution);

        let queue = self.queues.entry(channel).or_default();

        // A forced reprocess delivers the same capture again
        if queue.back().map(|q| q.update_timestamp) == Some(capture.update_timestamp) {
            queue.pop_back();
        }
        if queue
            .front()
            .map(|q| q.acquisition_samples != capture.acquisition_samples)
            .unwrap_or(false)
        {
            queue.clear();
        }
        let dissimilar = queue.front().map(|q| !q.similar_to(&capture)).unwrap_or(false);
        if dissimilar || changed || capture.trigger_adjustment == 0.0 {
            queue.clear();
        }

        queue.push_back(capture);
        while queue.len() > boost {
            queue.pop_front();
        }

        let reference_holdoff = collection.raw().holdoff;
        let Some((mut voltages, mut times)) = interleave(queue, reference_holdoff) else {
            return Ok(());
        };

        if self.config.smoothing {
            smooth_in_place(&mut voltages, &mut times, self.config.smoothing_window);
        }

        collection.set_data(ChannelDataSource::EtsVoltages, channel, voltages)?;
        collection.set_data(ChannelDataSource::EtsTimestamps, channel, times)?;
        Ok(())
    }
}

/// Interleave every capture in `queue` over the sample range they share.
/// Returns `None` after logging when a consistency guard fails.
fn interleave(queue: &VecDeque<EtsCapture>, reference_holdoff: f64) -> Option<(Vec<f64>, Vec<f64>)> {
    let shared_start = queue.iter().map(|c| c.start_offset()).max()?;
    let shared_end = queue
        .iter()
        .map(|c| c.start_offset() + c.samples.len() as i64)
        .min()?;
    let runlength = shared_end - shared_start;
    if runlength < 2 {
        error!("ETS overlap of {} samples is too short to interleave", runlength);
        return None;
    }
    let runlength = runlength as usize;

    let mut ordered: Vec<&EtsCapture> = queue.iter().collect();
    ordered.sort_by(|a, b| b.trigger_adjustment.total_cmp(&a.trigger_adjustment));

    let starts: Vec<i64> = ordered
        .iter()
        .map(|c| shared_start - c.start_offset())
        .collect();
    let sources: Vec<Option<&[f64]>> = ordered
        .iter()
        .map(|c| Some(&c.samples[..]).filter(|s| !s.is_empty()))
        .collect();

    if sources.len() != queue.len() {
        error!(
            "ETS source count {} does not match queue length {}",
            sources.len(),
            queue.len()
        );
        return None;
    }
    if let Some(q) = sources.iter().position(|s| s.is_none()) {
        error!("ETS source array {} is missing", q);
        return None;
    }
    if let Some(q) = starts.iter().position(|&s| s < 0) {
        error!("ETS start index {} of capture {} is negative", starts[q], q);
        return None;
    }
    for (q, (start, source)) in starts.iter().zip(&sources).enumerate() {
        let len = source.map(|s| s.len()).unwrap_or(0);
        if *start as usize + runlength > len {
            error!(
                "ETS run of {} from index {} exceeds length {} of capture {}",
                runlength, start, len, q
            );
            return None;
        }
    }

    let count = ordered.len();
    let mut voltages = Vec::with_capacity(runlength * count);
    for s in 0..runlength {
        for (source, &start) in sources.iter().zip(&starts) {
            if let Some(source) = source {
                voltages.push(source[start as usize + s]);
            }
        }
    }

    let source_times: Vec<f64> = ordered
        .iter()
        .zip(&starts)
        .map(|(c, &start)| {
            c.time_offset - c.trigger_adjustment
                + (reference_holdoff - c.holdoff)
                + start as f64 * c.sample_period
        })
        .collect();
    let period = ordered[0].sample_period;
    let mut times = Vec::with_capacity(runlength * count);
    for s in 0..runlength {
        for &t in &source_times {
            times.push(t + period * s as f64);
        }
    }

    debug!("ETS interleaved {} captures over {} samples", count, runlength);
    Some((voltages, times))
}

impl Processor for EtsEngine {
    fn name(&self) -> &str {
        "ets"
    }

    fn configure(&mut self, config: &Value) -> Result<()> {
        if !config.is_null() {
            self.config = serde_json::from_value(config.clone())?;
            self.detector = DifferenceDetector::new(self.config.change_threshold);
        }
        Ok(())
    }

    fn process(&mut self, collection: &ScopeDataCollection) -> Result<()> {
        if self.last_collection == Some(collection.id()) {
            return Ok(());
        }
        self.last_collection = Some(collection.id());

        let Some((boost, sample_period)) = self.eligibility(collection) else {
            self.status.publish(false, false, 0, 0.0);
            return Ok(());
        };

        self.update_queues(collection);

        let channels: Vec<ChannelId> = self.queues.keys().copied().collect();
        let mut effective = false;
        for channel in channels {
            self.run_ets(collection, channel, boost)?;
            effective |= self.queue_len(channel) > 1;
        }

        self.status
            .publish(true, effective, boost, boost as f64 / sample_period);
        Ok(())
    }

    fn reset(&mut self) {
        self.queues.clear();
        self.detector.clear();
        self.last_collection = None;
        self.status.publish(false, false, 0, 0.0);
    }
}
