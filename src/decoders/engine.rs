use super::binding::{bind_slots, BindingError, ChannelCandidate};
use super::coercion::coerce;
use super::plugin::{Decoder, DecoderDescriptor, DecoderInputs, DecoderKind, Parameters};
use crate::core::channel::write_registry;
use crate::core::{ChannelArray, ChannelData, ChannelId, ChannelKind, ElementType, ScopeDataCollection, SharedRegistry};
use anyhow::{anyhow, Result};
use log::{error, warn};
use serde_json::Value;

/// Runs one decoder or operator plugin against the channels bound to its
/// inputs
pub struct DecoderProcessor {
    plugin: Box<dyn Decoder>,
    descriptor: DecoderDescriptor,
    output: ChannelId,
    /// Indexed like `descriptor.inputs`; empty until first bound
    bindings: Vec<Option<ChannelId>>,
    parameters: Parameters,
    initialized: bool,
    completed: bool,
    force_pending: bool,
    last_collection: Option<u64>,
}

impl DecoderProcessor {
    /// Wrap `plugin` and register its output channel
    pub fn new(plugin: Box<dyn Decoder>, registry: &SharedRegistry) -> Self {
        let descriptor = plugin.descriptor();
        let kind = match descriptor.kind {
            DecoderKind::Decoder => ChannelKind::Decoder,
            DecoderKind::Operator => ChannelKind::Operator,
        };
        let output = {
            let mut registry = write_registry(registry);
            let ordinal = registry.of_kind(kind).len() + 1;
            registry.create(format!("{} {}", descriptor.name, ordinal), kind, descriptor.output)
        };
        let parameters = Parameters::from_schema(&descriptor.parameters);

        Self {
            plugin,
            descriptor,
            output,
            bindings: Vec::new(),
            parameters,
            initialized: false,
            completed: false,
            force_pending: false,
            last_collection: None,
        }
    }

    pub fn id(&self) -> &'static str {
        self.descriptor.id
    }

    pub fn name(&self) -> &'static str {
        self.descriptor.name
    }

    pub fn kind(&self) -> DecoderKind {
        self.descriptor.kind
    }

    pub fn descriptor(&self) -> &DecoderDescriptor {
        &self.descriptor
    }

    pub fn output_channel(&self) -> ChannelId {
        self.output
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Whether the latest pass wrote output
    pub fn completed(&self) -> bool {
        self.completed
    }

    /// Channel bound to `slot`, `None` when unbound or unknown
    pub fn binding(&self, slot: &str) -> Option<ChannelId> {
        let index = self.descriptor.inputs.iter().position(|s| s.name == slot)?;
        self.bindings.get(index).copied().flatten()
    }

    /// Slot names paired with their bound channels, in declaration order
    pub fn bindings(&self) -> impl Iterator<Item = (&str, Option<ChannelId>)> + '_ {
        self.descriptor
            .inputs
            .iter()
            .enumerate()
            .map(move |(i, slot)| (slot.name.as_str(), self.bindings.get(i).copied().flatten()))
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// Validate and store one parameter; the next pass reprocesses
    pub fn set_parameter(&mut self, name: &str, value: Value) -> Result<()> {
        let schema = self
            .descriptor
            .parameter(name)
            .ok_or_else(|| anyhow!("{} has no parameter {}", self.descriptor.name, name))?;
        schema.validate(&value)?;
        self.parameters.set(name, value);
        self.force_pending = true;
        Ok(())
    }

    /// Apply a JSON object of parameter values
    pub fn configure(&mut self, parameters: &Value) -> Result<()> {
        match parameters {
            Value::Null => Ok(()),
            Value::Object(map) => {
                for (name, value) in map {
                    self.set_parameter(name, value.clone())?;
                }
                Ok(())
            }
            other => Err(anyhow!("Decoder parameters must be an object, got {}", other)),
        }
    }

    /// Automatic wiring used when the processor is first added
    pub fn bind_existing_channels_to_input(
        &mut self,
        candidates: &[ChannelCandidate],
    ) -> Result<(), BindingError> {
        match bind_slots(&self.descriptor.inputs, candidates) {
            Ok(bound) => {
                self.bindings = bound;
                self.initialized = true;
                self.force_pending = true;
                Ok(())
            }
            Err(e) => {
                warn!("{}: {}", self.descriptor.name, e);
                self.initialized = false;
                Err(e)
            }
        }
    }

    /// Rebind one slot. A decoder moving a channel from another slot of the
    /// same type swaps the two bindings.
    pub fn update_source_channel(
        &mut self,
        slot: &str,
        channel: Option<ChannelId>,
    ) -> Result<(), BindingError> {
        let slots = &self.descriptor.inputs;
        let index = slots
            .iter()
            .position(|s| s.name == slot)
            .ok_or_else(|| BindingError::UnknownSlot { slot: slot.to_string() })?;
        if channel.is_none() && !slots[index].nullable {
            return Err(BindingError::NotNullable { slot: slot.to_string() });
        }

        if self.bindings.len() != slots.len() {
            self.bindings = vec![None; slots.len()];
        }

        let previous = self.bindings[index];
        if let Some(channel) = channel {
            let duplicate = self
                .bindings
                .iter()
                .enumerate()
                .position(|(i, b)| i != index && *b == Some(channel));
            if let Some(other) = duplicate {
                if self.descriptor.kind == DecoderKind::Decoder
                    && slots[other].element_type == slots[index].element_type
                {
                    self.bindings[other] = previous;
                }
            }
        }
        self.bindings[index] = channel;

        self.initialized = slots
            .iter()
            .zip(&self.bindings)
            .all(|(slot, bound)| slot.nullable || bound.is_some());
        self.force_pending = true;
        Ok(())
    }

    /// Unbind every slot fed by `channel`, typically because the channel
    /// was destroyed. Returns whether any binding changed.
    pub fn release_channel(&mut self, channel: ChannelId) -> bool {
        let mut changed = false;
        for bound in self.bindings.iter_mut().filter(|b| **b == Some(channel)) {
            *bound = None;
            changed = true;
        }
        if changed {
            self.initialized = self
                .descriptor
                .inputs
                .iter()
                .zip(&self.bindings)
                .all(|(slot, bound)| slot.nullable || bound.is_some());
            self.force_pending = true;
        }
        changed
    }

    /// Decode `collection`. Returns whether output was written for it.
    ///
    /// Repeated calls with the same collection are no-ops unless `force` is
    /// set or a binding/parameter change is pending.
    pub fn process(&mut self, collection: &ScopeDataCollection, force: bool) -> bool {
        if !self.initialized {
            self.completed = false;
            return false;
        }

        let fresh = force || self.force_pending || self.last_collection != Some(collection.id());
        if !fresh && self.completed {
            return true;
        }
        self.last_collection = Some(collection.id());
        self.force_pending = false;
        self.completed = false;

        let slots = &self.descriptor.inputs;
        if self.bindings.len() != slots.len() {
            error!(
                "{}: {} bound inputs for {} declared",
                self.descriptor.name,
                self.bindings.len(),
                slots.len()
            );
            return false;
        }

        let mut fetched: Vec<Option<ChannelData>> = Vec::with_capacity(slots.len());
        for (slot, bound) in slots.iter().zip(&self.bindings) {
            let data = bound.and_then(|channel| collection.get_best_data(channel));
            if data.is_none() && !slot.nullable {
                return false;
            }
            fetched.push(data);
        }

        let reference = slots
            .iter()
            .zip(&fetched)
            .filter_map(|(slot, data)| data.as_ref().map(|d| (slot, d)))
            .filter(|(_, data)| data.element_type() != ElementType::Events)
            .min_by_key(|(slot, _)| slot.nullable)
            .map(|(_, data)| data);
        let Some(reference) = reference else {
            return false;
        };
        let run_length = reference.len();

        let mut inputs = DecoderInputs::new(run_length);
        for (slot, data) in slots.iter().zip(&fetched) {
            let array = match data {
                Some(data) => match coerce(&data.array, slot.element_type) {
                    Ok(array) => array,
                    Err(e) => {
                        error!("{}: input {}: {}", self.descriptor.name, slot.name, e);
                        return false;
                    }
                },
                None => ChannelArray::default_of(slot.element_type, run_length),
            };
            // Event lists are not sample-aligned
            if slot.element_type != ElementType::Events && array.len() != run_length {
                warn!(
                    "{}: input {} has {} samples, expected {}",
                    self.descriptor.name,
                    slot.name,
                    array.len(),
                    run_length
                );
                return false;
            }
            inputs.insert(slot.name.clone(), array);
        }

        let output = match self
            .plugin
            .decode(&inputs, &self.parameters, reference.sample_period)
        {
            Ok(output) => output,
            Err(e) => {
                warn!("{}: decode failed: {}", self.descriptor.name, e);
                return false;
            }
        };
        if output.element_type() != self.descriptor.output {
            error!(
                "{}: produced {:?}, declared {:?}",
                self.descriptor.name,
                output.element_type(),
                self.descriptor.output
            );
            return false;
        }

        match collection.set_data(reference.source, self.output, output) {
            Ok(_) => {
                self.completed = true;
                true
            }
            Err(e) => {
                error!("{}: {}", self.descriptor.name, e);
                false
            }
        }
    }

    /// Drop per-collection state so the next pass starts fresh
    pub fn reset(&mut self) {
        self.last_collection = None;
        self.completed = false;
    }
}

impl std::fmt::Debug for DecoderProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoderProcessor")
            .field("id", &self.descriptor.id)
            .field("output", &self.output)
            .field("bindings", &self.bindings)
            .field("initialized", &self.initialized)
            .field("completed", &self.completed)
            .finish()
    }
}
