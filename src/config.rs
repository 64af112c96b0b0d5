use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// Equivalent-time sampling settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EtsConfig {
    pub enabled: bool,
    /// Collapse interleaved points closer than `smoothing_window`
    pub smoothing: bool,
    /// Viewport sample count below which ETS starts boosting
    pub min_viewport_samples: usize,
    /// Seconds
    pub smoothing_window: f64,
    /// Fraction of the channel's input span
    pub change_threshold: f64,
}

impl Default for EtsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            smoothing: false,
            min_viewport_samples: 2048,
            smoothing_window: 1e-9,
            change_threshold: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SincTriggerConfig {
    pub enabled: bool,
    pub max_iterations: usize,
    /// In sample-period units
    pub tolerance: f64,
}

impl Default for SincTriggerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_iterations: 50,
            tolerance: 1e-10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FftWindow {
    #[default]
    Hann,
    Rectangular,
    Blackman,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FftConfig {
    /// Analog channel names to transform
    pub channels: Vec<String>,
    pub window: FftWindow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MathOperation {
    Add,
    Subtract,
    Multiply,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MathConfig {
    pub a: String,
    pub b: String,
    pub operation: MathOperation,
}

/// A decoder or operator instance to create at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecoderConfig {
    /// Registry id, e.g. "i2c"
    pub id: String,
    #[serde(default)]
    pub parameters: Value,
}

/// Settings for the whole processing core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    pub ets: EtsConfig,
    pub sinc_trigger: SincTriggerConfig,
    /// Captures averaged per channel; 1 disables averaging
    pub averaging_depth: usize,
    /// Analog channel names whose polarity is flipped
    pub inverted: Vec<String>,
    pub fft: FftConfig,
    pub math: Option<MathConfig>,
    pub decoders: Vec<DecoderConfig>,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            ets: EtsConfig::default(),
            sinc_trigger: SincTriggerConfig::default(),
            averaging_depth: 1,
            inverted: Vec::new(),
            fft: FftConfig::default(),
            math: None,
            decoders: Vec::new(),
        }
    }
}

impl ProcessingConfig {
    pub fn from_json(config: Value) -> Result<Self> {
        serde_json::from_value(config).context("Failed to parse processing config")
    }

    /// Load from a JSON file; missing fields take their defaults
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        serde_json::from_str(&content).context("Failed to parse config JSON")
    }

    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create config directory")?;
        }

        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write config file {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = ProcessingConfig::from_json(serde_json::json!({
            "ets": { "smoothing": true },
            "inverted": ["B"]
        }))
        .unwrap();

        assert!(config.ets.enabled);
        assert!(config.ets.smoothing);
        assert_eq!(config.ets.min_viewport_samples, 2048);
        assert_eq!(config.sinc_trigger.max_iterations, 50);
        assert_eq!(config.inverted, vec!["B".to_string()]);
        assert_eq!(config.averaging_depth, 1);
    }
}
