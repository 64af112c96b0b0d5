//! Sub-sample trigger alignment.
//!
//! The coarse trigger sits on a whole sample. The aligner brackets the
//! trigger level between the neighbouring samples and refines the crossing
//! by false position, evaluating the waveform through a sinc reconstruction
//! of the whole window instead of the raw samples.

use crate::config::SincTriggerConfig;
use crate::core::{ChannelKind, Processor, ScopeBuffer, ScopeDataCollection, TriggerMode};
use crate::core::channel::read_registry;
use anyhow::Result;
use log::{debug, trace};
use serde_json::Value;
use std::f64::consts::PI;

fn sinc(x: f64) -> f64 {
    if x.abs() < 1e-12 {
        1.0
    } else {
        x.sin() / x
    }
}

/// Band-limited value of `samples` at fractional index `position`.
///
/// O(N) per query: sums `p[i] * sinc(pi * (position - i))` over the window.
pub fn sinc_value(samples: &[f64], position: f64) -> f64 {
    samples
        .iter()
        .enumerate()
        .map(|(i, &p)| p * sinc(PI * (position - i as f64)))
        .sum()
}

pub struct SincTriggerAligner {
    config: SincTriggerConfig,
    last_collection: Option<u64>,
}

impl SincTriggerAligner {
    pub fn new(config: SincTriggerConfig) -> Self {
        Self {
            config,
            last_collection: None,
        }
    }

    /// Time from the sample at `trigger_index` to the reconstructed crossing
    /// of `level`, in seconds. Returns exactly 0.0 when the crossing cannot
    /// be determined.
    pub fn time_shift(&self, samples: &[f64], sample_period: f64, level: f64, trigger_index: usize) -> f64 {
        if trigger_index < 1 || trigger_index + 1 >= samples.len() {
            return 0.0;
        }

        let mut t_before = (trigger_index - 1) as f64;
        let mut v_before = samples[trigger_index - 1];
        let mut t_after = (trigger_index + 1) as f64;
        let mut v_after = samples[trigger_index + 1];

        if (v_before - level) * (v_after - level) > 0.0 {
            trace!("trigger level {} not bracketed around index {}", level, trigger_index);
            return 0.0;
        }

        let mut previous = f64::NAN;
        let mut crossing = None;
        for _ in 0..self.config.max_iterations {
            if v_after == v_before {
                break;
            }
            let candidate = t_before + (level - v_before) * (t_after - t_before) / (v_after - v_before);
            if (candidate - previous).abs() < self.config.tolerance {
                crossing = Some(candidate);
                break;
            }
            previous = candidate;

            let value = sinc_value(samples, candidate);
            if (value > level) == (v_after > level) {
                t_after = candidate;
                v_after = value;
            } else {
                t_before = candidate;
                v_before = value;
            }
        }

        let Some(crossing) = crossing else {
            debug!("sinc trigger search did not converge");
            return 0.0;
        };

        let shift = (crossing - (trigger_index - 1) as f64) * sample_period;
        if shift.abs() > 2.0 * sample_period {
            return 0.0;
        }
        // Relative to the nominal trigger sample, one period after the bracket start
        shift - sample_period
    }
}

impl Processor for SincTriggerAligner {
    fn name(&self) -> &str {
        "sinc_trigger"
    }

    fn configure(&mut self, config: &Value) -> Result<()> {
        if !config.is_null() {
            self.config = serde_json::from_value(config.clone())?;
        }
        Ok(())
    }

    fn process(&mut self, collection: &ScopeDataCollection) -> Result<()> {
        if self.last_collection == Some(collection.id()) {
            return Ok(());
        }
        self.last_collection = Some(collection.id());

        if collection.trigger_adjustment_applied() {
            return Ok(());
        }
        if !self.config.enabled {
            collection.set_trigger_adjustment(0.0);
            return Ok(());
        }

        let raw = collection.raw();
        let trigger = raw.trigger;
        let analog_source = trigger.source.filter(|ch| {
            read_registry(collection.registry())
                .get(*ch)
                .map(|c| c.kind == ChannelKind::Analog)
                .unwrap_or(false)
        });

        let periods = (
            raw.sample_period(ScopeBuffer::Viewport),
            raw.sample_period(ScopeBuffer::Acquisition),
        );
        let (source, sample_period) = match (trigger.mode, analog_source, periods) {
            (TriggerMode::Digital, _, _) => (None, 0.0),
            (_, Some(source), (Some(viewport), Some(acquisition))) if viewport == acquisition => {
                (Some(source), viewport)
            }
            _ => (None, 0.0),
        };

        // Trigger level is in device terms, so skip inversion and averaging
        let data = source.and_then(|ch| collection.get_unprocessed_data(ScopeBuffer::Viewport, ch));
        let Some(samples) = data.as_ref().and_then(|d| d.array.as_float()) else {
            collection.set_trigger_adjustment(0.0);
            return Ok(());
        };
        if sample_period <= 0.0 {
            collection.set_trigger_adjustment(0.0);
            return Ok(());
        }

        let time_offset = raw.time_offset(ScopeBuffer::Viewport).unwrap_or(0.0);
        let nominal = ((raw.holdoff - time_offset) / sample_period).round();
        let shift = if nominal < 0.0 {
            0.0
        } else {
            self.time_shift(samples, sample_period, trigger.level, nominal as usize)
        };

        collection.set_trigger_adjustment(shift);
        Ok(())
    }

    fn reset(&mut self) {
        self.last_collection = None;
    }
}
