use crate::core::{ChannelId, ChannelResolution};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Flags channels whose waveform shape changed significantly between
/// consecutive captures.
pub struct DifferenceDetector {
    threshold: f64,
    previous: HashMap<ChannelId, Arc<[f64]>>,
    flagged: HashSet<ChannelId>,
}

impl DifferenceDetector {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            previous: HashMap::new(),
            flagged: HashSet::new(),
        }
    }

    /// Force the next check of `channel` to report a change
    pub fn flag(&mut self, channel: ChannelId) {
        self.flagged.insert(channel);
    }

    /// Compare against the last capture seen for `channel` and remember
    /// `samples` for the next call
    pub fn check(
        &mut self,
        channel: ChannelId,
        samples: &Arc<[f64]>,
        resolution: Option<ChannelResolution>,
    ) -> bool {
        let mut changed = self.flagged.remove(&channel);

        if let Some(previous) = self.previous.get(&channel) {
            if previous.len() == samples.len() && !samples.is_empty() {
                let mean_abs = previous
                    .iter()
                    .zip(samples.iter())
                    .map(|(a, b)| (a - b).abs())
                    .sum::<f64>()
                    / samples.len() as f64;
                let span = resolution
                    .map(|r| r.span())
                    .filter(|s| *s > 0.0)
                    .unwrap_or_else(|| value_span(previous));
                if span > 0.0 && mean_abs > self.threshold * span {
                    changed = true;
                }
            }
        }

        self.previous.insert(channel, Arc::clone(samples));
        changed
    }

    pub fn forget(&mut self, channel: ChannelId) {
        self.previous.remove(&channel);
        self.flagged.remove(&channel);
    }

    pub fn clear(&mut self) {
        self.previous.clear();
        self.flagged.clear();
    }
}

fn value_span(samples: &[f64]) -> f64 {
    let (min, max) = samples
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if min.is_finite() && max.is_finite() {
        max - min
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ChannelRegistry;

    fn channel() -> ChannelId {
        ChannelRegistry::with_hardware(1, 0).find("A").unwrap()
    }

    #[test]
    fn test_small_jitter_is_not_a_change() {
        let ch = channel();
        let mut detector = DifferenceDetector::new(0.2);
        let a: Arc<[f64]> = (0..64).map(|i| (i as f64 * 0.1).sin()).collect();
        let b: Arc<[f64]> = (0..64).map(|i| (i as f64 * 0.1 + 0.01).sin()).collect();

        assert!(!detector.check(ch, &a, None));
        assert!(!detector.check(ch, &b, None));
    }

    #[test]
    fn test_shape_change_is_flagged() {
        let ch = channel();
        let mut detector = DifferenceDetector::new(0.2);
        let sine: Arc<[f64]> = (0..64).map(|i| (i as f64 * 0.1).sin()).collect();
        let inverted: Arc<[f64]> = sine.iter().map(|v| -v).collect();

        detector.check(ch, &sine, None);
        assert!(detector.check(ch, &inverted, None));
    }

    #[test]
    fn test_external_flag_is_consumed() {
        let ch = channel();
        let mut detector = DifferenceDetector::new(0.2);
        let a: Arc<[f64]> = vec![0.0; 8].into();

        detector.flag(ch);
        assert!(detector.check(ch, &a, None));
        assert!(!detector.check(ch, &a, None));
    }
}
