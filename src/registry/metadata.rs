use crate::decoders::{Decoder, DecoderKind};
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Schema for a configurable decoder parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: String,
    pub default: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl ParameterSchema {
    pub fn new(name: impl Into<String>, param_type: impl Into<String>, default: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            param_type: param_type.into(),
            default,
            min: None,
            max: None,
        }
    }

    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    /// Check a candidate value against the declared range
    pub fn validate(&self, value: &serde_json::Value) -> Result<()> {
        if let Some(v) = value.as_f64() {
            if self.min.map(|min| v < min).unwrap_or(false) || self.max.map(|max| v > max).unwrap_or(false) {
                return Err(anyhow!(
                    "Parameter {} = {} outside [{:?}, {:?}]",
                    self.name,
                    v,
                    self.min,
                    self.max
                ));
            }
        }
        Ok(())
    }
}

/// Factory function type for creating decoder instances
pub type DecoderFactory = fn() -> Box<dyn Decoder>;

/// Registry entry for a decoder or operator plugin
#[derive(Clone)]
pub struct DecoderMetadata {
    pub id: &'static str,
    pub name: &'static str,
    pub kind: DecoderKind,
    pub factory: DecoderFactory,
}

impl DecoderMetadata {
    /// Create a new instance of this plugin
    pub fn create_instance(&self) -> Box<dyn Decoder> {
        (self.factory)()
    }
}

impl std::fmt::Debug for DecoderMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoderMetadata")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

inventory::collect!(DecoderMetadata);

/// Every plugin linked into the binary, sorted by id
pub fn available_decoders() -> Vec<DecoderMetadata> {
    let mut decoders: Vec<DecoderMetadata> = inventory::iter::<DecoderMetadata>
        .into_iter()
        .cloned()
        .collect();
    decoders.sort_by_key(|d| d.id);
    decoders
}

pub fn create_decoder(id: &str) -> Result<Box<dyn Decoder>> {
    inventory::iter::<DecoderMetadata>
        .into_iter()
        .find(|d| d.id == id)
        .map(|d| d.create_instance())
        .ok_or_else(|| anyhow!("Unknown decoder type: {}", id))
}
