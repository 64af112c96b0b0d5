use scopelab::core::channel::read_registry;
use scopelab::core::{
    ChannelDataSource, ChannelId, ChannelRegistry, RawAcquisition, ScopeBuffer, ScopeDataCollection,
    SharedRegistry,
};
use scopelab::decoders::binding::gather_candidates;
use scopelab::decoders::{BindingError, DecoderKind, DecoderProcessor};
use scopelab::registry::{available_decoders, create_decoder};
use serde_json::json;
use std::sync::Arc;

fn setup() -> SharedRegistry {
    ChannelRegistry::default().into_shared()
}

fn channel(registry: &SharedRegistry, name: &str) -> ChannelId {
    read_registry(registry).find(name).unwrap()
}

fn decoder(registry: &SharedRegistry, id: &str) -> DecoderProcessor {
    DecoderProcessor::new(create_decoder(id).unwrap(), registry)
}

/// Viewport-only capture with the given channel arrays
fn collection(
    registry: &SharedRegistry,
    analog: &[(&str, Vec<f64>)],
    digital: &[(&str, Vec<bool>)],
) -> ScopeDataCollection {
    let mut raw = RawAcquisition::new(1).with_buffer(ScopeBuffer::Viewport, 1e-9, 0.0);
    for (name, samples) in analog {
        raw.insert(ScopeBuffer::Viewport, channel(registry, name), samples.clone());
    }
    for (name, bits) in digital {
        raw.insert(ScopeBuffer::Viewport, channel(registry, name), bits.clone());
    }
    ScopeDataCollection::new(Arc::new(raw), registry.clone())
}

#[test]
fn test_builtin_plugins_are_registered() {
    let ids: Vec<&str> = available_decoders().iter().map(|d| d.id).collect();
    assert_eq!(ids, vec!["arithmetic", "i2c", "logic", "spi"]);

    let logic = available_decoders()
        .into_iter()
        .find(|d| d.id == "logic")
        .unwrap();
    assert_eq!(logic.kind, DecoderKind::Operator);
}

#[test]
fn test_output_channel_registered_on_creation() {
    let registry = setup();
    let before = read_registry(&registry).len();
    let first = decoder(&registry, "i2c");
    let second = decoder(&registry, "i2c");

    let registry = read_registry(&registry);
    assert_eq!(registry.len(), before + 2);
    assert_eq!(registry.get(first.output_channel()).unwrap().name, "I2C 1");
    assert_eq!(registry.get(second.output_channel()).unwrap().name, "I2C 2");
    assert!(registry.is_destructible(first.output_channel()));
}

#[test]
fn test_decoder_swaps_bindings_of_same_type() {
    let registry = setup();
    let (d0, d1) = (channel(&registry, "D0"), channel(&registry, "D1"));
    let mut i2c = decoder(&registry, "i2c");

    i2c.update_source_channel("SDA", Some(d0)).unwrap();
    i2c.update_source_channel("SCL", Some(d1)).unwrap();
    assert!(i2c.is_initialized());

    i2c.update_source_channel("SCL", Some(d0)).unwrap();
    assert_eq!(i2c.binding("SDA"), Some(d1));
    assert_eq!(i2c.binding("SCL"), Some(d0));
}

#[test]
fn test_operator_never_swaps() {
    let registry = setup();
    let (a, b) = (channel(&registry, "A"), channel(&registry, "B"));
    let mut arithmetic = decoder(&registry, "arithmetic");

    arithmetic.update_source_channel("A", Some(a)).unwrap();
    arithmetic.update_source_channel("B", Some(b)).unwrap();
    arithmetic.update_source_channel("B", Some(a)).unwrap();

    assert_eq!(arithmetic.binding("A"), Some(a));
    assert_eq!(arithmetic.binding("B"), Some(a));
}

#[test]
fn test_update_rejects_unknown_slot_and_null_mandatory() {
    let registry = setup();
    let mut i2c = decoder(&registry, "i2c");

    assert_eq!(
        i2c.update_source_channel("SDIO", None),
        Err(BindingError::UnknownSlot {
            slot: "SDIO".to_string()
        })
    );
    assert_eq!(
        i2c.update_source_channel("SDA", None),
        Err(BindingError::NotNullable {
            slot: "SDA".to_string()
        })
    );
}

#[test]
fn test_unbindable_decoder_stays_uninitialized() {
    let registry = setup();
    let mut i2c = decoder(&registry, "i2c");

    let err = i2c.bind_existing_channels_to_input(&[]).unwrap_err();
    assert!(matches!(err, BindingError::NoCandidate { .. }));
    assert!(!i2c.is_initialized());

    let collection = collection(&registry, &[], &[]);
    assert!(!i2c.process(&collection, false));
    assert!(!i2c.completed());
}

#[test]
fn test_auto_binding_prefers_active_lines() {
    let registry = setup();
    let idle = vec![true; 64];
    let clock: Vec<bool> = (0..64).map(|i| i % 4 < 2).collect();
    let data: Vec<bool> = (0..64).map(|i| i % 16 < 8).collect();
    let collection = collection(
        &registry,
        &[],
        &[("D0", idle), ("D1", data), ("D2", clock)],
    );

    let mut i2c = decoder(&registry, "i2c");
    let candidates = gather_candidates(
        &read_registry(&registry),
        Some(&collection),
        &[i2c.output_channel()],
    );
    i2c.bind_existing_channels_to_input(&candidates).unwrap();

    assert_eq!(i2c.binding("SCL"), Some(channel(&registry, "D2")));
    assert_eq!(i2c.binding("SDA"), Some(channel(&registry, "D1")));
}

#[test]
fn test_unbound_nullable_input_reads_default() {
    let registry = setup();
    let mut logic = decoder(&registry, "logic");
    logic.configure(&json!({ "operation": "xor" })).unwrap();
    logic
        .update_source_channel("A", Some(channel(&registry, "D0")))
        .unwrap();
    assert!(logic.is_initialized());
    assert_eq!(logic.binding("B"), None);

    let collection = collection(&registry, &[], &[("D0", vec![true, false, true, true])]);
    assert!(logic.process(&collection, false));

    let output = collection
        .get_data(ChannelDataSource::Viewport, logic.output_channel())
        .unwrap();
    assert_eq!(output.array.as_bool().unwrap(), &[true, false, true, true]);
}

#[test]
fn test_analog_input_binarized_for_bool_slot() {
    let registry = setup();
    let mut logic = decoder(&registry, "logic");
    logic.configure(&json!({ "operation": "not" })).unwrap();
    logic
        .update_source_channel("A", Some(channel(&registry, "A")))
        .unwrap();

    let collection = collection(&registry, &[("A", vec![0.0, 0.1, 3.2, 3.3, 0.2, 0.0])], &[]);
    assert!(logic.process(&collection, false));

    let output = collection
        .get_data(ChannelDataSource::Viewport, logic.output_channel())
        .unwrap();
    assert_eq!(
        output.array.as_bool().unwrap(),
        &[true, true, false, false, true, true]
    );
}

#[test]
fn test_impossible_coercion_aborts_pass() {
    let registry = setup();
    let mut arithmetic = decoder(&registry, "arithmetic");
    arithmetic
        .update_source_channel("A", Some(channel(&registry, "D0")))
        .unwrap();
    arithmetic
        .update_source_channel("B", Some(channel(&registry, "A")))
        .unwrap();

    let collection = collection(
        &registry,
        &[("A", vec![1.0; 4])],
        &[("D0", vec![true; 4])],
    );
    assert!(!arithmetic.process(&collection, false));
    assert!(collection
        .get_data(ChannelDataSource::Viewport, arithmetic.output_channel())
        .is_none());
}

#[test]
fn test_ragged_inputs_abort_pass() {
    let registry = setup();
    let mut arithmetic = decoder(&registry, "arithmetic");
    arithmetic
        .update_source_channel("A", Some(channel(&registry, "A")))
        .unwrap();
    arithmetic
        .update_source_channel("B", Some(channel(&registry, "B")))
        .unwrap();

    let collection = collection(&registry, &[("A", vec![1.0; 8]), ("B", vec![1.0; 6])], &[]);
    assert!(!arithmetic.process(&collection, false));
    assert!(!arithmetic.completed());
}

#[test]
fn test_missing_mandatory_data_leaves_decoder_pending() {
    let registry = setup();
    let mut arithmetic = decoder(&registry, "arithmetic");
    arithmetic
        .update_source_channel("A", Some(channel(&registry, "A")))
        .unwrap();
    arithmetic
        .update_source_channel("B", Some(channel(&registry, "B")))
        .unwrap();

    let collection = collection(&registry, &[("A", vec![1.0; 8])], &[]);
    assert!(!arithmetic.process(&collection, false));
}

#[test]
fn test_same_collection_is_not_decoded_twice() {
    let registry = setup();
    let mut arithmetic = decoder(&registry, "arithmetic");
    arithmetic
        .update_source_channel("A", Some(channel(&registry, "A")))
        .unwrap();
    arithmetic
        .update_source_channel("B", Some(channel(&registry, "B")))
        .unwrap();
    let collection = collection(&registry, &[("A", vec![1.0; 4]), ("B", vec![2.0; 4])], &[]);
    let output = arithmetic.output_channel();

    assert!(arithmetic.process(&collection, false));
    let first = collection.get_data(ChannelDataSource::Viewport, output).unwrap();
    assert_eq!(first.array.as_float().unwrap(), &[3.0; 4]);

    assert!(arithmetic.process(&collection, false));
    let again = collection.get_data(ChannelDataSource::Viewport, output).unwrap();
    assert!(again.same_data(&first));

    assert!(arithmetic.process(&collection, true));
    let forced = collection.get_data(ChannelDataSource::Viewport, output).unwrap();
    assert!(!forced.same_data(&first));

    arithmetic
        .set_parameter("operation", json!("multiply"))
        .unwrap();
    assert!(arithmetic.process(&collection, false));
    let changed = collection.get_data(ChannelDataSource::Viewport, output).unwrap();
    assert_eq!(changed.array.as_float().unwrap(), &[2.0; 4]);
}

#[test]
fn test_parameter_validation() {
    let registry = setup();
    let mut spi = decoder(&registry, "spi");

    assert!(spi.set_parameter("bits", json!(16)).is_ok());
    assert_eq!(spi.parameters().u64("bits", 0), 16);
    assert!(spi.set_parameter("bits", json!(0)).is_err());
    assert!(spi.set_parameter("bits", json!(64)).is_err());
    assert!(spi.set_parameter("baud", json!(9600)).is_err());
    assert_eq!(spi.parameters().u64("bits", 0), 16);

    assert!(spi.configure(&json!([1, 2])).is_err());
    assert!(spi.configure(&serde_json::Value::Null).is_ok());
}

#[test]
fn test_failing_plugin_reports_incomplete() {
    let registry = setup();
    let mut arithmetic = decoder(&registry, "arithmetic");
    arithmetic
        .set_parameter("operation", json!("modulo"))
        .unwrap();
    arithmetic
        .update_source_channel("A", Some(channel(&registry, "A")))
        .unwrap();
    arithmetic
        .update_source_channel("B", Some(channel(&registry, "B")))
        .unwrap();

    let collection = collection(&registry, &[("A", vec![1.0; 4]), ("B", vec![2.0; 4])], &[]);
    assert!(!arithmetic.process(&collection, false));
    assert!(!arithmetic.completed());
}

#[test]
fn test_release_channel_unbinds_slots() {
    let registry = setup();
    let d0 = channel(&registry, "D0");
    let mut logic = decoder(&registry, "logic");
    logic.update_source_channel("A", Some(d0)).unwrap();
    logic.update_source_channel("B", Some(d0)).unwrap();

    assert!(logic.release_channel(d0));
    assert_eq!(logic.binding("A"), None);
    assert_eq!(logic.binding("B"), None);
    assert!(!logic.is_initialized());
    assert!(!logic.release_channel(d0));
}
