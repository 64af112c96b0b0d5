use crate::config::ProcessingConfig;
use crate::core::channel::{read_registry, write_registry};
use crate::core::{
    ChannelId, Processor, ProcessorStage, RawAcquisition, ScopeDataCollection, SharedRegistry,
};
use crate::decoders::binding::gather_candidates;
use crate::decoders::{ChannelCandidate, DecoderProcessor};
use crate::engine::state::PipelineState;
use crate::observability::{MetricsCollector, ProcessorMetrics};
use crate::processors::{
    AverageProcessor, EtsEngine, EtsStatus, FftProcessor, InvertProcessor, MathProcessor,
    SincTriggerAligner,
};
use crate::registry::create_decoder;
use crate::resilience::GuardedProcessor;
use anyhow::{anyhow, Result};
use log::{debug, info, warn};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Receives every fully processed collection, once per pass
pub trait Recorder: Send {
    fn record(&mut self, collection: &ScopeDataCollection) -> Result<()>;
}

/// The latest published collection, shared with consumer threads
#[derive(Debug, Clone, Default)]
pub struct PublishedCollection {
    slot: Arc<Mutex<Option<Arc<ScopeDataCollection>>>>,
}

impl PublishedCollection {
    pub fn get(&self) -> Option<Arc<ScopeDataCollection>> {
        self.slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn publish(&self, collection: Arc<ScopeDataCollection>) {
        *self
            .slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(collection);
    }
}

struct DecoderEntry {
    key: String,
    processor: DecoderProcessor,
    metrics: Arc<ProcessorMetrics>,
}

/// Turns each delivered raw acquisition into one fully processed
/// [`ScopeDataCollection`] and publishes it.
///
/// FFT processors run first so they see untouched analog data, then the
/// other processors in registration order, then decoders and operators
/// until no further progress is made.
pub struct ProcessorPipeline {
    registry: SharedRegistry,
    processors: Vec<(String, GuardedProcessor)>,
    decoders: Vec<DecoderEntry>,
    metrics: MetricsCollector,
    recorder: Option<Box<dyn Recorder>>,
    ets_status: Option<Arc<EtsStatus>>,
    state: PipelineState,
    started: Option<Instant>,
    last_timestamp: Option<u64>,
    last_raw: Option<Arc<RawAcquisition>>,
    published: PublishedCollection,
    next_id: usize,
}

impl ProcessorPipeline {
    pub fn new(registry: SharedRegistry) -> Self {
        Self {
            registry,
            processors: Vec::new(),
            decoders: Vec::new(),
            metrics: MetricsCollector::new(),
            recorder: None,
            ets_status: None,
            state: PipelineState::Idle,
            started: None,
            last_timestamp: None,
            last_raw: None,
            published: PublishedCollection::default(),
            next_id: 0,
        }
    }

    /// Build and initialize the standard processor chain
    pub fn from_config(registry: SharedRegistry, config: &ProcessingConfig) -> Result<Self> {
        let mut pipeline = Self::new(registry.clone());

        if !config.fft.channels.is_empty() {
            pipeline.add_processor(Box::new(FftProcessor::new(&registry, &config.fft)?));
        }
        // Math combines the traces as displayed, so inversion comes first
        if !config.inverted.is_empty() {
            pipeline.add_processor(Box::new(InvertProcessor::new(&registry, &config.inverted)?));
        }
        if let Some(math) = &config.math {
            pipeline.add_processor(Box::new(MathProcessor::new(&registry, math)?));
        }
        if config.averaging_depth > 1 {
            pipeline.add_processor(Box::new(AverageProcessor::new(config.averaging_depth)));
        }
        pipeline.add_processor(Box::new(SincTriggerAligner::new(config.sinc_trigger.clone())));

        let ets = EtsEngine::new(config.ets.clone());
        pipeline.ets_status = Some(ets.status());
        pipeline.add_processor(Box::new(ets));

        for decoder in &config.decoders {
            pipeline.add_decoder(&decoder.id, &decoder.parameters)?;
        }

        pipeline.initialize()?;
        Ok(pipeline)
    }

    pub fn from_json(registry: SharedRegistry, config: Value) -> Result<Self> {
        Self::from_config(registry, &ProcessingConfig::from_json(config)?)
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    /// Transition to a new state with validation
    pub fn transition_to(&mut self, new_state: PipelineState) -> Result<()> {
        if !self.state.can_transition_to(&new_state) {
            return Err(anyhow!(
                "Invalid state transition: {} -> {}",
                self.state.name(),
                new_state.name()
            ));
        }
        self.state = new_state;
        Ok(())
    }

    /// Start accepting acquisitions
    pub fn initialize(&mut self) -> Result<()> {
        self.transition_to(PipelineState::Initializing { progress: 0 })?;
        let now = Instant::now();
        self.started = Some(now);
        self.transition_to(PipelineState::Running {
            start_time: Some(now),
            acquisitions_processed: 0,
        })?;
        info!(
            "Pipeline running with {} processors and {} decoders",
            self.processors.len(),
            self.decoders.len()
        );
        Ok(())
    }

    pub fn pause(&mut self) -> Result<()> {
        let processed = self.state.acquisitions_processed();
        self.transition_to(PipelineState::Paused {
            pause_time: Some(Instant::now()),
            acquisitions_processed: processed,
        })
    }

    pub fn resume(&mut self) -> Result<()> {
        let processed = self.state.acquisitions_processed();
        self.transition_to(PipelineState::Running {
            start_time: self.started,
            acquisitions_processed: processed,
        })
    }

    pub fn stop(&mut self) -> Result<()> {
        let total = self.state.acquisitions_processed();
        self.transition_to(PipelineState::Stopped {
            duration: self.started.map(|s| s.elapsed()),
            total_acquisitions: total,
        })
    }

    /// Whether initialization finished; forced passes are allowed from then on
    pub fn is_initialized(&self) -> bool {
        matches!(
            self.state,
            PipelineState::Running { .. } | PipelineState::Paused { .. } | PipelineState::Stopped { .. }
        )
    }

    fn next_key(&mut self, name: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", name, self.next_id)
    }

    /// Register a processor; returns its pipeline key
    pub fn add_processor(&mut self, processor: Box<dyn Processor>) -> String {
        let key = self.next_key(processor.name());
        let metrics = Arc::new(ProcessorMetrics::new(processor.name()));
        self.metrics.register(key.clone(), metrics.clone());
        self.processors
            .push((key.clone(), GuardedProcessor::new(processor, metrics)));
        debug!("Added processor {}", key);
        key
    }

    /// Remove a processor and destroy the channels it produced
    pub fn remove_processor(&mut self, key: &str) -> bool {
        let Some(index) = self.processors.iter().position(|(k, _)| k == key) else {
            return false;
        };
        let (_, processor) = self.processors.remove(index);
        self.metrics.unregister(key);
        for channel in processor.output_channels() {
            self.destroy_channel(channel);
        }
        true
    }

    pub fn processor_keys(&self) -> Vec<String> {
        self.processors.iter().map(|(k, _)| k.clone()).collect()
    }

    /// Instantiate a registered decoder plugin and wire it automatically.
    ///
    /// A decoder whose mandatory inputs cannot be bound is still added but
    /// stays uninitialized until rebound.
    pub fn add_decoder(&mut self, id: &str, parameters: &Value) -> Result<String> {
        let mut processor = DecoderProcessor::new(create_decoder(id)?, &self.registry);
        if let Err(e) = processor.configure(parameters) {
            self.destroy_channel(processor.output_channel());
            return Err(e);
        }

        let key = self.next_key(id);
        let candidates = self.candidates_for(processor.output_channel());
        if let Err(e) = processor.bind_existing_channels_to_input(&candidates) {
            warn!("Decoder {} left unbound: {}", key, e);
        }

        let metrics = Arc::new(ProcessorMetrics::new(id));
        self.metrics.register(key.clone(), metrics.clone());
        self.decoders.push(DecoderEntry {
            key: key.clone(),
            processor,
            metrics,
        });
        Ok(key)
    }

    /// Channels a decoder could be wired to, measured on the latest
    /// published collection
    fn candidates_for(&self, output: ChannelId) -> Vec<ChannelCandidate> {
        let current = self.published.get();
        gather_candidates(&read_registry(&self.registry), current.as_deref(), &[output])
    }

    /// Run auto-binding again for an existing decoder
    pub fn rebind_decoder(&mut self, key: &str) -> Result<()> {
        let index = self.decoder_index(key)?;
        let candidates = self.candidates_for(self.decoders[index].processor.output_channel());
        self.decoders[index]
            .processor
            .bind_existing_channels_to_input(&candidates)?;
        self.reprocess();
        Ok(())
    }

    pub fn remove_decoder(&mut self, key: &str) -> bool {
        let Ok(index) = self.decoder_index(key) else {
            return false;
        };
        let entry = self.decoders.remove(index);
        self.metrics.unregister(key);
        self.destroy_channel(entry.processor.output_channel());
        true
    }

    pub fn decoder(&self, key: &str) -> Option<&DecoderProcessor> {
        self.decoders
            .iter()
            .find(|e| e.key == key)
            .map(|e| &e.processor)
    }

    pub fn decoders(&self) -> impl Iterator<Item = (&str, &DecoderProcessor)> {
        self.decoders
            .iter()
            .map(|e| (e.key.as_str(), &e.processor))
    }

    fn decoder_index(&self, key: &str) -> Result<usize> {
        self.decoders
            .iter()
            .position(|e| e.key == key)
            .ok_or_else(|| anyhow!("Unknown decoder: {}", key))
    }

    /// Rebind one decoder input and reprocess the last acquisition
    pub fn update_decoder_source(
        &mut self,
        key: &str,
        slot: &str,
        channel: Option<ChannelId>,
    ) -> Result<()> {
        let index = self.decoder_index(key)?;
        self.decoders[index]
            .processor
            .update_source_channel(slot, channel)?;
        self.reprocess();
        Ok(())
    }

    pub fn set_decoder_parameter(&mut self, key: &str, name: &str, value: Value) -> Result<()> {
        let index = self.decoder_index(key)?;
        self.decoders[index].processor.set_parameter(name, value)?;
        self.reprocess();
        Ok(())
    }

    fn destroy_channel(&mut self, channel: ChannelId) {
        write_registry(&self.registry).destroy(channel);
        for entry in &mut self.decoders {
            if entry.processor.release_channel(channel) {
                debug!("Decoder {} lost input {}", entry.key, channel);
            }
        }
    }

    /// Output channel of every processor and decoder, keyed by pipeline key
    pub fn output_channels(&self) -> Vec<(String, ChannelId)> {
        let processors = self
            .processors
            .iter()
            .flat_map(|(key, p)| p.output_channels().into_iter().map(move |c| (key.clone(), c)));
        let decoders = self
            .decoders
            .iter()
            .map(|e| (e.key.clone(), e.processor.output_channel()));
        processors.chain(decoders).collect()
    }

    pub fn set_recorder(&mut self, recorder: Box<dyn Recorder>) {
        self.recorder = Some(recorder);
    }

    pub fn clear_recorder(&mut self) -> Option<Box<dyn Recorder>> {
        self.recorder.take()
    }

    pub fn ets_status(&self) -> Option<Arc<EtsStatus>> {
        self.ets_status.clone()
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Handle for consumers of published collections
    pub fn published(&self) -> PublishedCollection {
        self.published.clone()
    }

    pub fn current(&self) -> Option<Arc<ScopeDataCollection>> {
        self.published.get()
    }

    /// Process a newly delivered acquisition. Returns whether a collection
    /// was published.
    pub fn handle_acquisition(&mut self, raw: Option<Arc<RawAcquisition>>) -> bool {
        let Some(raw) = raw else {
            return false;
        };
        if !self.state.is_running() {
            return false;
        }
        if self.last_timestamp == Some(raw.update_timestamp) {
            return false;
        }

        self.last_timestamp = Some(raw.update_timestamp);
        self.last_raw = Some(Arc::clone(&raw));
        self.run_pass(raw, false);
        true
    }

    /// Process the last acquisition again, bypassing change detection
    pub fn reprocess(&mut self) -> bool {
        if !self.is_initialized() {
            return false;
        }
        let Some(raw) = self.last_raw.clone() else {
            return false;
        };
        self.run_pass(raw, true);
        true
    }

    /// Forget per-acquisition state in every processor
    pub fn reset(&mut self) {
        for (_, processor) in &mut self.processors {
            processor.reset();
        }
        for entry in &mut self.decoders {
            entry.processor.reset();
        }
        self.last_timestamp = None;
    }

    fn run_pass(&mut self, raw: Arc<RawAcquisition>, force: bool) {
        let collection = ScopeDataCollection::new(raw, self.registry.clone());

        for stage in [ProcessorStage::Fft, ProcessorStage::Simple] {
            for (key, processor) in self.processors.iter_mut().filter(|(_, p)| p.stage() == stage) {
                if let Err(e) = processor.process(&collection) {
                    warn!("Processor {} failed: {:#}", key, e);
                }
            }
        }

        self.run_decoders(&collection, force);

        if let Some(recorder) = self.recorder.as_mut() {
            if let Err(e) = recorder.record(&collection) {
                warn!("Recorder rejected collection {}: {:#}", collection.id(), e);
            }
        }

        self.published.publish(Arc::new(collection));
        match &mut self.state {
            PipelineState::Running {
                acquisitions_processed,
                ..
            }
            | PipelineState::Paused {
                acquisitions_processed,
                ..
            } => *acquisitions_processed += 1,
            _ => {}
        }
    }

    /// Run decoders until the number still unfinished stops shrinking.
    /// Returns that number.
    fn run_decoders(&mut self, collection: &ScopeDataCollection, force: bool) -> usize {
        let mut previous = usize::MAX;
        let mut round = 0;
        let pending = loop {
            let mut pending = 0;
            for entry in &mut self.decoders {
                let start = entry.metrics.start_processing();
                let done = entry.processor.process(collection, force && round == 0);
                entry.metrics.finish_processing(start);
                if !done {
                    pending += 1;
                }
            }
            round += 1;

            if pending == 0 || pending >= previous {
                break pending;
            }
            previous = pending;
        };

        for entry in &self.decoders {
            if entry.processor.completed() {
                entry.metrics.record_pass();
            } else {
                entry.metrics.record_failure();
            }
        }
        if pending > 0 {
            debug!(
                "{} of {} decoders unresolved after {} rounds",
                pending,
                self.decoders.len(),
                round
            );
        }
        pending
    }
}
