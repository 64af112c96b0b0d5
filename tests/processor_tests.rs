use scopelab::config::SincTriggerConfig;
use scopelab::core::channel::read_registry;
use scopelab::core::{
    ChannelDataSource, ChannelId, ChannelRegistry, Processor, RawAcquisition, ScopeBuffer,
    ScopeDataCollection, SharedRegistry,
};
use scopelab::engine::ProcessorPipeline;
use scopelab::processors::{AverageProcessor, InvertProcessor, SincTriggerAligner};
use serde_json::json;
use std::sync::Arc;

fn channel(registry: &SharedRegistry, name: &str) -> ChannelId {
    read_registry(registry).find(name).unwrap()
}

fn invert(registry: &SharedRegistry, name: &str) -> InvertProcessor {
    InvertProcessor::new(registry, &[name.to_string()]).unwrap()
}

/// Viewport-only capture with a constant trace on A
fn constant(registry: &SharedRegistry, timestamp: u64, value: f64, len: usize) -> Arc<RawAcquisition> {
    let mut raw = RawAcquisition::new(timestamp).with_buffer(ScopeBuffer::Viewport, 1e-9, 0.0);
    raw.insert(ScopeBuffer::Viewport, channel(registry, "A"), vec![value; len]);
    Arc::new(raw)
}

fn viewport_of(collection: &ScopeDataCollection, channel: ChannelId) -> Vec<f64> {
    collection
        .get_data(ChannelDataSource::Viewport, channel)
        .unwrap()
        .array
        .as_float()
        .unwrap()
        .to_vec()
}

/// Rising ramp on A crossing 1.0 at sample 50.3, triggered on A at sample 50
fn triggered_ramp(registry: &SharedRegistry) -> Arc<RawAcquisition> {
    let a = channel(registry, "A");
    let mut raw = RawAcquisition::new(1)
        .with_buffer(ScopeBuffer::Viewport, 1e-9, 0.0)
        .with_buffer(ScopeBuffer::Acquisition, 1e-9, 0.0);
    let ramp: Vec<f64> = (0..100).map(|i| (i as f64 - 50.3) * 0.1 + 1.0).collect();
    raw.insert(ScopeBuffer::Viewport, a, ramp.clone());
    raw.insert(ScopeBuffer::Acquisition, a, ramp);
    raw.holdoff = 50e-9;
    raw.trigger.source = Some(a);
    raw.trigger.level = 1.0;
    Arc::new(raw)
}

#[test]
fn test_invert_negates_scope_buffers_and_keeps_metadata() {
    let registry = ChannelRegistry::default().into_shared();
    let (a, b) = (channel(&registry, "A"), channel(&registry, "B"));

    let mut raw = RawAcquisition::new(1)
        .with_buffer(ScopeBuffer::Viewport, 2e-9, -5e-9)
        .with_buffer(ScopeBuffer::Acquisition, 2e-9, -5e-9);
    raw.set_partial(ScopeBuffer::Acquisition, true);
    raw.insert(ScopeBuffer::Viewport, a, vec![1.0, -2.0, 3.0]);
    raw.insert(ScopeBuffer::Acquisition, a, vec![4.0, -5.0]);
    raw.insert(ScopeBuffer::Viewport, b, vec![1.0, 1.0, 1.0]);
    let collection = ScopeDataCollection::new(Arc::new(raw), registry.clone());

    let mut processor = invert(&registry, "A");
    processor.process(&collection).unwrap();

    assert_eq!(viewport_of(&collection, a), vec![-1.0, 2.0, -3.0]);
    assert_eq!(viewport_of(&collection, b), vec![1.0, 1.0, 1.0]);

    let acquisition = collection
        .get_data(ChannelDataSource::Acquisition, a)
        .unwrap();
    assert_eq!(acquisition.array.as_float().unwrap(), &[-4.0, 5.0]);
    assert!(acquisition.partial);
    assert_eq!(acquisition.sample_period, 2e-9);
    assert_eq!(acquisition.time_offset, -5e-9);

    let viewport = collection.get_data(ChannelDataSource::Viewport, a).unwrap();
    assert!(!viewport.partial);
    assert_eq!(viewport.sample_period, 2e-9);
    assert_eq!(viewport.time_offset, -5e-9);

    // Running again on the same collection must not flip it back
    processor.process(&collection).unwrap();
    let again = collection.get_data(ChannelDataSource::Viewport, a).unwrap();
    assert!(again.same_data(&viewport));
    assert_eq!(viewport_of(&collection, a), vec![-1.0, 2.0, -3.0]);
}

#[test]
fn test_average_is_running_mean_capped_at_depth() {
    let registry = ChannelRegistry::default().into_shared();
    let a = channel(&registry, "A");
    let mut average = AverageProcessor::new(3);

    let mut means = Vec::new();
    for (timestamp, value) in [(1, 1.0), (2, 2.0), (3, 3.0), (4, 4.0)] {
        let collection = ScopeDataCollection::new(constant(&registry, timestamp, value, 4), registry.clone());
        average.process(&collection).unwrap();
        means.push(viewport_of(&collection, a)[0]);
    }
    assert_eq!(means, vec![1.0, 1.5, 2.0, 3.0]);
}

#[test]
fn test_average_restarts_when_length_changes() {
    let registry = ChannelRegistry::default().into_shared();
    let a = channel(&registry, "A");
    let mut average = AverageProcessor::new(4);

    for (timestamp, value) in [(1, 1.0), (2, 3.0)] {
        let collection = ScopeDataCollection::new(constant(&registry, timestamp, value, 4), registry.clone());
        average.process(&collection).unwrap();
    }

    let collection = ScopeDataCollection::new(constant(&registry, 3, 10.0, 8), registry.clone());
    average.process(&collection).unwrap();
    assert_eq!(viewport_of(&collection, a), vec![10.0; 8]);
}

#[test]
fn test_average_same_collection_is_not_counted_twice() {
    let registry = ChannelRegistry::default().into_shared();
    let a = channel(&registry, "A");
    let mut average = AverageProcessor::new(4);

    let first = ScopeDataCollection::new(constant(&registry, 1, 1.0, 4), registry.clone());
    average.process(&first).unwrap();
    let second = ScopeDataCollection::new(constant(&registry, 2, 3.0, 4), registry.clone());
    average.process(&second).unwrap();
    let output = second.get_data(ChannelDataSource::Viewport, a).unwrap();

    average.process(&second).unwrap();
    let again = second.get_data(ChannelDataSource::Viewport, a).unwrap();
    assert!(again.same_data(&output));
    assert_eq!(viewport_of(&second, a), vec![2.0; 4]);
}

#[test]
fn test_average_of_inverted_capture_stable_across_rebuilt_collections() {
    let registry = ChannelRegistry::default().into_shared();
    let a = channel(&registry, "A");
    let mut inverter = invert(&registry, "A");
    let mut average = AverageProcessor::new(4);

    // The last capture is delivered twice, as a forced reprocess does
    let latest = constant(&registry, 2, 3.0, 4);
    let mut means = Vec::new();
    for raw in [constant(&registry, 1, 1.0, 4), latest.clone(), latest] {
        let collection = ScopeDataCollection::new(raw, registry.clone());
        inverter.process(&collection).unwrap();
        average.process(&collection).unwrap();
        means.push(viewport_of(&collection, a)[0]);
    }
    assert_eq!(means, vec![-1.0, -2.0, -2.0]);
}

#[test]
fn test_reprocess_does_not_shift_inverted_average() {
    let registry = ChannelRegistry::default().into_shared();
    let a = channel(&registry, "A");
    let mut pipeline = ProcessorPipeline::from_json(
        registry.clone(),
        json!({ "inverted": ["A"], "averaging_depth": 4 }),
    )
    .unwrap();

    pipeline.handle_acquisition(Some(constant(&registry, 1, 1.0, 16)));
    pipeline.handle_acquisition(Some(constant(&registry, 2, 3.0, 16)));
    assert_eq!(viewport_of(&pipeline.current().unwrap(), a), vec![-2.0; 16]);

    assert!(pipeline.reprocess());
    assert!(pipeline.reprocess());
    assert_eq!(viewport_of(&pipeline.current().unwrap(), a), vec![-2.0; 16]);
}

#[test]
fn test_trigger_aligner_ignores_display_inversion() {
    let registry = ChannelRegistry::default().into_shared();
    let a = channel(&registry, "A");
    let raw = triggered_ramp(&registry);

    let plain = ScopeDataCollection::new(raw.clone(), registry.clone());
    SincTriggerAligner::new(SincTriggerConfig::default())
        .process(&plain)
        .unwrap();

    let inverted = ScopeDataCollection::new(raw, registry.clone());
    invert(&registry, "A").process(&inverted).unwrap();
    SincTriggerAligner::new(SincTriggerConfig::default())
        .process(&inverted)
        .unwrap();

    assert!(viewport_of(&inverted, a)[0] > 0.0);
    assert!(inverted.trigger_adjustment_applied());
    assert!(inverted.trigger_adjustment() != 0.0);
    assert_eq!(inverted.trigger_adjustment(), plain.trigger_adjustment());

    let estimated = 50.0 + inverted.trigger_adjustment() / 1e-9;
    assert!((estimated - 50.3).abs() < 1.0, "estimated {}", estimated);
}

#[test]
fn test_math_combines_inverted_traces() {
    let registry = ChannelRegistry::default().into_shared();
    let mut pipeline = ProcessorPipeline::from_json(
        registry.clone(),
        json!({
            "inverted": ["A"],
            "math": { "a": "A", "b": "B", "operation": "add" }
        }),
    )
    .unwrap();

    let mut raw = RawAcquisition::new(1).with_buffer(ScopeBuffer::Viewport, 1e-9, 0.0);
    raw.insert(ScopeBuffer::Viewport, channel(&registry, "A"), vec![2.0; 8]);
    raw.insert(ScopeBuffer::Viewport, channel(&registry, "B"), vec![1.0; 8]);
    assert!(pipeline.handle_acquisition(Some(Arc::new(raw))));

    let sum = channel(&registry, "A+B");
    assert_eq!(viewport_of(&pipeline.current().unwrap(), sum), vec![-1.0; 8]);
}
