use super::resolve_channels;
use crate::config::{FftConfig, FftWindow};
use crate::core::channel::write_registry;
use crate::core::{
    ChannelArray, ChannelDataSource, ChannelId, ChannelKind, ElementType, Processor,
    ProcessorStage, ScopeDataCollection, SharedRegistry,
};
use anyhow::Result;
use rustfft::{num_complex::Complex, FftPlanner};
use std::collections::HashMap;
use std::f64::consts::PI;

/// Magnitude spectrum (dB) of analog channels, computed before any other
/// processor touches the data
pub struct FftProcessor {
    window: FftWindow,
    outputs: Vec<(ChannelId, ChannelId)>,
    planner: FftPlanner<f64>,
    cache: HashMap<ChannelId, (u64, ChannelArray)>,
}

impl FftProcessor {
    pub fn new(registry: &SharedRegistry, config: &FftConfig) -> Result<Self> {
        let sources = resolve_channels(registry, &config.channels)?;
        let mut registry = write_registry(registry);
        let outputs = sources
            .into_iter()
            .map(|source| {
                let name = registry
                    .get(source)
                    .map(|c| format!("FFT {}", c.name))
                    .unwrap_or_else(|| "FFT".to_string());
                (source, registry.create(name, ChannelKind::Fft, ElementType::Float))
            })
            .collect();

        Ok(Self {
            window: config.window,
            outputs,
            planner: FftPlanner::new(),
            cache: HashMap::new(),
        })
    }

    /// FFT output channel for an analog source channel
    pub fn output_for(&self, source: ChannelId) -> Option<ChannelId> {
        self.outputs
            .iter()
            .find(|(s, _)| *s == source)
            .map(|(_, out)| *out)
    }

    fn spectrum(&mut self, samples: &[f64]) -> Vec<f64> {
        let size = samples.len();
        let fft = self.planner.plan_fft_forward(size);
        let window = create_window(self.window, size);
        let gain: f64 = window.iter().sum::<f64>().max(f64::EPSILON);

        let mut buffer: Vec<Complex<f64>> = samples
            .iter()
            .zip(window.iter())
            .map(|(&s, &w)| Complex::new(s * w, 0.0))
            .collect();
        fft.process(&mut buffer);

        buffer
            .iter()
            .take(size / 2 + 1)
            .map(|bin| 20.0 * (2.0 * bin.norm() / gain + 1e-10).log10())
            .collect()
    }
}

fn create_window(window: FftWindow, size: usize) -> Vec<f64> {
    if size < 2 {
        return vec![1.0; size];
    }
    let denom = (size - 1) as f64;
    (0..size)
        .map(|i| {
            let x = 2.0 * PI * i as f64 / denom;
            match window {
                FftWindow::Rectangular => 1.0,
                FftWindow::Hann => 0.5 * (1.0 - x.cos()),
                FftWindow::Blackman => 0.42 - 0.5 * x.cos() + 0.08 * (2.0 * x).cos(),
            }
        })
        .collect()
}

impl Processor for FftProcessor {
    fn name(&self) -> &str {
        "fft"
    }

    fn stage(&self) -> ProcessorStage {
        ProcessorStage::Fft
    }

    fn process(&mut self, collection: &ScopeDataCollection) -> Result<()> {
        for (source, output) in self.outputs.clone() {
            let Some(data) = collection.get_data(ChannelDataSource::Viewport, source) else {
                continue;
            };
            let Some(samples) = data.array.as_float() else {
                continue;
            };
            if samples.is_empty() {
                continue;
            }

            let cached = self
                .cache
                .get(&source)
                .filter(|(version, _)| *version == data.version())
                .map(|(_, spectrum)| spectrum.clone());
            let spectrum = match cached {
                Some(spectrum) => spectrum,
                None => {
                    let spectrum = ChannelArray::from(self.spectrum(samples));
                    self.cache.insert(source, (data.version(), spectrum.clone()));
                    spectrum
                }
            };
            collection.set_data(ChannelDataSource::Viewport, output, spectrum)?;
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.cache.clear();
    }

    fn output_channels(&self) -> Vec<ChannelId> {
        self.outputs.iter().map(|(_, out)| *out).collect()
    }
}
