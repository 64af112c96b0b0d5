use crate::core::{ChannelArray, DecoderEvent, ElementType};
use crate::registry::ParameterSchema;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Decoders interpret protocol wires; operators compute values from
/// their operands and never swap bindings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecoderKind {
    Decoder,
    Operator,
}

/// A named input pin of a decoder
#[derive(Debug, Clone, PartialEq)]
pub struct InputSlot {
    pub name: String,
    pub element_type: ElementType,
    /// May legitimately stay unconnected
    pub nullable: bool,
    /// Expected toggle rate in Hz, used to rank auto-binding
    pub toggle_rate: Option<f64>,
}

impl InputSlot {
    pub fn required(name: impl Into<String>, element_type: ElementType) -> Self {
        Self {
            name: name.into(),
            element_type,
            nullable: false,
            toggle_rate: None,
        }
    }

    pub fn optional(name: impl Into<String>, element_type: ElementType) -> Self {
        Self {
            nullable: true,
            ..Self::required(name, element_type)
        }
    }

    pub fn with_toggle_rate(mut self, rate: f64) -> Self {
        self.toggle_rate = Some(rate);
        self
    }
}

#[derive(Debug, Clone)]
pub struct DecoderDescriptor {
    pub id: &'static str,
    pub name: &'static str,
    pub kind: DecoderKind,
    pub inputs: Vec<InputSlot>,
    pub parameters: Vec<ParameterSchema>,
    pub output: ElementType,
}

impl DecoderDescriptor {
    pub fn slot(&self, name: &str) -> Option<&InputSlot> {
        self.inputs.iter().find(|s| s.name == name)
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterSchema> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

/// Current parameter values of one decoder instance
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameters {
    values: HashMap<String, Value>,
}

impl Parameters {
    pub fn from_schema(schema: &[ParameterSchema]) -> Self {
        Self {
            values: schema
                .iter()
                .map(|p| (p.name.clone(), p.default.clone()))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn f64(&self, name: &str, default: f64) -> f64 {
        self.get(name).and_then(Value::as_f64).unwrap_or(default)
    }

    pub fn u64(&self, name: &str, default: u64) -> u64 {
        self.get(name).and_then(Value::as_u64).unwrap_or(default)
    }

    pub fn bool(&self, name: &str, default: bool) -> bool {
        self.get(name).and_then(Value::as_bool).unwrap_or(default)
    }

    pub fn str<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.get(name).and_then(Value::as_str).unwrap_or(default)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub(crate) fn set(&mut self, name: &str, value: Value) {
        self.values.insert(name.to_string(), value);
    }
}

/// Named, length-aligned input arrays handed to a plugin
#[derive(Debug, Default)]
pub struct DecoderInputs {
    arrays: HashMap<String, ChannelArray>,
    run_length: usize,
}

impl DecoderInputs {
    pub fn new(run_length: usize) -> Self {
        Self {
            arrays: HashMap::new(),
            run_length,
        }
    }

    pub fn insert(&mut self, slot: impl Into<String>, array: ChannelArray) {
        self.arrays.insert(slot.into(), array);
    }

    pub fn run_length(&self) -> usize {
        self.run_length
    }

    pub fn get(&self, slot: &str) -> Option<&ChannelArray> {
        self.arrays.get(slot)
    }

    pub fn bool(&self, slot: &str) -> Result<&[bool]> {
        self.get(slot)
            .and_then(ChannelArray::as_bool)
            .ok_or_else(|| anyhow!("Input {} is not a bool array", slot))
    }

    pub fn float(&self, slot: &str) -> Result<&[f64]> {
        self.get(slot)
            .and_then(ChannelArray::as_float)
            .ok_or_else(|| anyhow!("Input {} is not a float array", slot))
    }

    pub fn events(&self, slot: &str) -> Result<&[DecoderEvent]> {
        self.get(slot)
            .and_then(ChannelArray::as_events)
            .ok_or_else(|| anyhow!("Input {} is not an event array", slot))
    }
}

/// Protocol decoder or operator plugin
pub trait Decoder: Send {
    fn descriptor(&self) -> DecoderDescriptor;

    /// Turn the assembled inputs into one output array of
    /// `descriptor().output` type
    fn decode(
        &mut self,
        inputs: &DecoderInputs,
        parameters: &Parameters,
        sample_period: f64,
    ) -> Result<ChannelArray>;
}
