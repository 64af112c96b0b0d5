use crate::core::channel::read_registry;
use crate::core::{
    ChannelId, ChannelResolution, RawAcquisition, ScopeBuffer, SharedRegistry, TriggerEdge, TriggerMode,
    TriggerSettings,
};
use crate::hal::{AcquisitionSource, SourceState};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::f64::consts::PI;
use tokio::time::{sleep, Duration};

const GOLDEN_RATIO_FRACTION: f64 = 0.618_033_988_749_895;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeSimulationConfig {
    pub sample_period: f64,
    pub viewport_samples: usize,
    /// Sine period on channel A, in samples
    pub signal_period_samples: f64,
    pub amplitude: f64,
    /// Delay before each capture is delivered
    pub interval_ms: u64,
    /// Stop after this many captures
    pub max_acquisitions: Option<u64>,
    /// Bytes bit-banged on D0 (SCL) and D1 (SDA)
    pub i2c_bytes: Vec<u8>,
}

impl Default for ScopeSimulationConfig {
    fn default() -> Self {
        Self {
            sample_period: 1e-9,
            viewport_samples: 512,
            signal_period_samples: 64.0,
            amplitude: 1.0,
            interval_ms: 0,
            max_acquisitions: None,
            i2c_bytes: vec![0xA0, 0x42],
        }
    }
}

/// Two-wire bus lines for a write of `bytes`, four samples per bit,
/// padded with idle-high samples up to `len`
pub fn i2c_lines(bytes: &[u8], len: usize) -> (Vec<bool>, Vec<bool>) {
    let mut sda = vec![true; 4];
    let mut scl = vec![true; 4];
    sda.extend([false, false]);
    scl.extend([true, false]);

    let push_bit = |value: bool, sda: &mut Vec<bool>, scl: &mut Vec<bool>| {
        sda.extend([value; 4]);
        scl.extend([false, true, true, false]);
    };
    for &byte in bytes {
        for n in (0..8).rev() {
            push_bit(byte >> n & 1 == 1, &mut sda, &mut scl);
        }
        push_bit(false, &mut sda, &mut scl);
    }

    sda.extend([false, false, true, true]);
    scl.extend([false, true, true, true]);

    let total = len.max(sda.len());
    sda.resize(total, true);
    scl.resize(total, true);
    (sda, scl)
}

/// Synthetic scope: a sine on A, its quadrature on B and an I2C
/// transaction clocked on D0 with data on D1. Each capture's trigger
/// crossing lands at a different sub-sample phase, so captures can be
/// interleaved.
pub struct SimulatedScope {
    config: ScopeSimulationConfig,
    registry: SharedRegistry,
    state: SourceState,
    delivered: u64,
}

impl SimulatedScope {
    pub fn new(registry: SharedRegistry) -> Self {
        Self::with_config(registry, ScopeSimulationConfig::default())
    }

    pub fn with_config(registry: SharedRegistry, config: ScopeSimulationConfig) -> Self {
        Self {
            config,
            registry,
            state: SourceState::Unopened,
            delivered: 0,
        }
    }

    pub fn config(&self) -> &ScopeSimulationConfig {
        &self.config
    }

    /// Sub-sample trigger phase of capture `n`, in (0, 1)
    fn phase(n: u64) -> f64 {
        ((n + 1) as f64 * GOLDEN_RATIO_FRACTION).fract()
    }

    /// Build capture number `n` without touching the source state
    pub fn generate(&self, n: u64) -> RawAcquisition {
        let config = &self.config;
        let period = config.sample_period;
        let len = config.viewport_samples;
        let holdoff_samples = (len / 2) as i64;
        let crossing = (holdoff_samples as f64 + Self::phase(n) - 0.5) * period;
        let omega = 2.0 * PI / (config.signal_period_samples * period);

        let channel = |name: &str| -> Option<ChannelId> { read_registry(&self.registry).find(name) };

        let mut raw = RawAcquisition::new(n + 1)
            .with_buffer(ScopeBuffer::Viewport, period, 0.0)
            .with_buffer(ScopeBuffer::Acquisition, period, 0.0);
        raw.holdoff_samples = holdoff_samples;
        raw.holdoff = holdoff_samples as f64 * period;
        raw.acquisition_samples = len;
        raw.fetch_progress = 1.0;
        raw.trigger = TriggerSettings {
            mode: TriggerMode::Edge,
            source: channel("A"),
            level: 0.0,
            edge: TriggerEdge::Rising,
        };

        let resolution = ChannelResolution {
            min: -1.25 * config.amplitude,
            max: 1.25 * config.amplitude,
            gain_setting: 0,
        };
        let phase_at = |i: usize| omega * (i as f64 * period - crossing);
        let analog = [
            ("A", (0..len).map(|i| config.amplitude * phase_at(i).sin()).collect::<Vec<f64>>()),
            ("B", (0..len).map(|i| config.amplitude * phase_at(i).cos()).collect::<Vec<f64>>()),
        ];
        for (name, samples) in analog {
            if let Some(id) = channel(name) {
                raw.set_resolution(id, resolution);
                raw.insert(ScopeBuffer::Viewport, id, samples.clone());
                raw.insert(ScopeBuffer::Acquisition, id, samples);
            }
        }

        let mut bytes = config.i2c_bytes.clone();
        if let Some(last) = bytes.last_mut() {
            *last = last.wrapping_add(n as u8);
        }
        let (mut sda, mut scl) = i2c_lines(&bytes, len);
        sda.truncate(len);
        scl.truncate(len);
        for (name, bits) in [("D0", scl), ("D1", sda)] {
            if let Some(id) = channel(name) {
                raw.insert(ScopeBuffer::Viewport, id, bits.clone());
                raw.insert(ScopeBuffer::Acquisition, id, bits);
            }
        }

        raw
    }
}

#[async_trait]
impl AcquisitionSource for SimulatedScope {
    fn name(&self) -> &str {
        "simulated-scope"
    }

    async fn configure(&mut self, config: Value) -> Result<()> {
        if self.state != SourceState::Unopened {
            return Err(anyhow!("Cannot configure source in state {:?}", self.state));
        }
        if !config.is_null() {
            self.config = serde_json::from_value(config)?;
        }
        Ok(())
    }

    async fn open(&mut self) -> Result<()> {
        if self.state != SourceState::Unopened {
            return Err(anyhow!("Cannot open source in state {:?}", self.state));
        }
        self.state = SourceState::Opened;
        Ok(())
    }

    async fn start(&mut self) -> Result<()> {
        if self.state != SourceState::Opened && self.state != SourceState::Stopped {
            return Err(anyhow!("Cannot start source in state {:?}", self.state));
        }
        self.state = SourceState::Running;
        Ok(())
    }

    async fn read_acquisition(&mut self) -> Result<Option<RawAcquisition>> {
        if self.state != SourceState::Running {
            return Err(anyhow!("Source not running"));
        }
        if let Some(max) = self.config.max_acquisitions {
            if self.delivered >= max {
                return Ok(None);
            }
        }
        if self.config.interval_ms > 0 {
            sleep(Duration::from_millis(self.config.interval_ms)).await;
        }

        let raw = self.generate(self.delivered);
        self.delivered += 1;
        Ok(Some(raw))
    }

    async fn stop(&mut self) -> Result<()> {
        if self.state != SourceState::Running {
            return Ok(());
        }
        self.state = SourceState::Stopped;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.state == SourceState::Running {
            self.stop().await?;
        }
        self.state = SourceState::Closed;
        Ok(())
    }

    fn state(&self) -> SourceState {
        self.state.clone()
    }
}
