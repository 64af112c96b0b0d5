use super::resolve_channels;
use crate::config::{MathConfig, MathOperation};
use crate::core::channel::write_registry;
use crate::core::{
    ChannelArray, ChannelDataSource, ChannelId, ChannelKind, ElementType, Processor,
    ScopeDataCollection, SharedRegistry,
};
use anyhow::{bail, Result};
use log::warn;

/// Sample-wise combination of two analog channels into a math channel
pub struct MathProcessor {
    a: ChannelId,
    b: ChannelId,
    operation: MathOperation,
    output: ChannelId,
    last: Option<((u64, u64), ChannelArray)>,
}

impl MathProcessor {
    pub fn new(registry: &SharedRegistry, config: &MathConfig) -> Result<Self> {
        let inputs = resolve_channels(registry, &[config.a.clone(), config.b.clone()])?;
        let [a, b] = inputs[..] else {
            bail!("Math needs exactly two input channels");
        };

        let symbol = match config.operation {
            MathOperation::Add => "+",
            MathOperation::Subtract => "-",
            MathOperation::Multiply => "*",
        };
        let output = write_registry(registry).create(
            format!("{}{}{}", config.a, symbol, config.b),
            ChannelKind::Math,
            ElementType::Float,
        );

        Ok(Self {
            a,
            b,
            operation: config.operation,
            output,
            last: None,
        })
    }

    pub fn output(&self) -> ChannelId {
        self.output
    }

    fn apply(&self, a: f64, b: f64) -> f64 {
        match self.operation {
            MathOperation::Add => a + b,
            MathOperation::Subtract => a - b,
            MathOperation::Multiply => a * b,
        }
    }
}

impl Processor for MathProcessor {
    fn name(&self) -> &str {
        "math"
    }

    fn process(&mut self, collection: &ScopeDataCollection) -> Result<()> {
        let a = collection.get_data(ChannelDataSource::Viewport, self.a);
        let b = collection.get_data(ChannelDataSource::Viewport, self.b);
        let (Some(a), Some(b)) = (a, b) else {
            return Ok(());
        };

        let key = (a.version(), b.version());
        if let Some((last_key, result)) = &self.last {
            if *last_key == key {
                collection.set_data(ChannelDataSource::Viewport, self.output, result.clone())?;
                return Ok(());
            }
        }

        let (Some(xs), Some(ys)) = (a.array.as_float(), b.array.as_float()) else {
            return Ok(());
        };
        if xs.len() != ys.len() {
            warn!("math inputs differ in length: {} vs {}", xs.len(), ys.len());
            return Ok(());
        }

        let result = ChannelArray::from(
            xs.iter()
                .zip(ys.iter())
                .map(|(&x, &y)| self.apply(x, y))
                .collect::<Vec<_>>(),
        );
        collection.set_data(ChannelDataSource::Viewport, self.output, result.clone())?;
        self.last = Some((key, result));
        Ok(())
    }

    fn reset(&mut self) {
        self.last = None;
    }

    fn output_channels(&self) -> Vec<ChannelId> {
        vec![self.output]
    }
}
