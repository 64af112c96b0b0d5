use crate::core::{ChannelArray, ElementType};
use anyhow::{bail, Result};

const LOW_THRESHOLD: f64 = 0.4;
const HIGH_THRESHOLD: f64 = 0.6;

/// Binarize an analog trace with hysteresis between 40% and 60% of its
/// value range
pub fn schmitt_trigger(samples: &[f64]) -> Vec<bool> {
    let (min, max) = samples
        .iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if max <= min {
        return vec![false; samples.len()];
    }

    let span = max - min;
    let low = min + LOW_THRESHOLD * span;
    let high = min + HIGH_THRESHOLD * span;
    let mut state = samples[0] > min + 0.5 * span;

    samples
        .iter()
        .map(|&v| {
            if state && v < low {
                state = false;
            } else if !state && v > high {
                state = true;
            }
            state
        })
        .collect()
}

/// Adapt `array` to the element type a slot declares
pub fn coerce(array: &ChannelArray, wanted: ElementType) -> Result<ChannelArray> {
    match (array, wanted) {
        (array, wanted) if array.element_type() == wanted => Ok(array.clone()),
        (ChannelArray::Float(samples), ElementType::Bool) => {
            Ok(ChannelArray::from(schmitt_trigger(samples)))
        }
        (array, wanted) => bail!(
            "No conversion from {:?} to {:?}",
            array.element_type(),
            wanted
        ),
    }
}

/// Number of level changes in a digital trace
pub fn transitions(bits: &[bool]) -> usize {
    bits.windows(2).filter(|w| w[0] != w[1]).count()
}
