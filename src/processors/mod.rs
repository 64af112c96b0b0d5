pub mod average;
pub mod ets;
pub mod fft;
pub mod invert;
pub mod math;
pub mod sinc_trigger;

pub use average::AverageProcessor;
pub use ets::{EtsEngine, EtsStatus};
pub use fft::FftProcessor;
pub use invert::InvertProcessor;
pub use math::MathProcessor;
pub use sinc_trigger::SincTriggerAligner;

use crate::core::channel::read_registry;
use crate::core::{ChannelId, SharedRegistry};
use anyhow::{anyhow, Result};

/// Look up channels by name, failing on the first unknown one
pub(crate) fn resolve_channels(registry: &SharedRegistry, names: &[String]) -> Result<Vec<ChannelId>> {
    let registry = read_registry(registry);
    names
        .iter()
        .map(|name| {
            registry
                .find(name)
                .ok_or_else(|| anyhow!("Unknown channel: {}", name))
        })
        .collect()
}
