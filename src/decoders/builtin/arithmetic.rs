use crate::core::{ChannelArray, ElementType};
use crate::decoders::{Decoder, DecoderDescriptor, DecoderInputs, DecoderKind, InputSlot, Parameters};
use crate::registry::{DecoderMetadata, ParameterSchema};
use anyhow::{bail, Result};
use serde_json::json;

/// Sample-wise arithmetic on two analog operands
#[derive(Debug, Default)]
pub struct ArithmeticOperator;

fn create() -> Box<dyn Decoder> {
    Box::new(ArithmeticOperator)
}

inventory::submit! {
    DecoderMetadata {
        id: "arithmetic",
        name: "Arithmetic",
        kind: DecoderKind::Operator,
        factory: create,
    }
}

impl Decoder for ArithmeticOperator {
    fn descriptor(&self) -> DecoderDescriptor {
        DecoderDescriptor {
            id: "arithmetic",
            name: "Arithmetic",
            kind: DecoderKind::Operator,
            inputs: vec![
                InputSlot::required("A", ElementType::Float),
                InputSlot::required("B", ElementType::Float),
            ],
            parameters: vec![ParameterSchema::new("operation", "string", json!("add"))],
            output: ElementType::Float,
        }
    }

    fn decode(&mut self, inputs: &DecoderInputs, parameters: &Parameters, _sample_period: f64) -> Result<ChannelArray> {
        let a = inputs.float("A")?;
        let b = inputs.float("B")?;
        let op: fn(f64, f64) -> f64 = match parameters.str("operation", "add") {
            "add" => |x, y| x + y,
            "subtract" => |x, y| x - y,
            "multiply" => |x, y| x * y,
            "divide" => |x, y| x / y,
            other => bail!("Unknown arithmetic operation: {}", other),
        };
        Ok(ChannelArray::from(
            a.iter().zip(b).map(|(&x, &y)| op(x, y)).collect::<Vec<_>>(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subtract() {
        let mut inputs = DecoderInputs::new(3);
        inputs.insert("A", ChannelArray::from(vec![1.0, 2.0, 3.0]));
        inputs.insert("B", ChannelArray::from(vec![0.5, 0.5, 4.0]));
        let mut parameters = Parameters::default();
        parameters.set("operation", json!("subtract"));

        let out = ArithmeticOperator.decode(&inputs, &parameters, 1e-9).unwrap();
        assert_eq!(out.as_float().unwrap(), &[0.5, 1.5, -1.0]);
    }

    #[test]
    fn test_unknown_operation_fails() {
        let mut inputs = DecoderInputs::new(1);
        inputs.insert("A", ChannelArray::from(vec![1.0]));
        inputs.insert("B", ChannelArray::from(vec![1.0]));
        let mut parameters = Parameters::default();
        parameters.set("operation", json!("modulo"));
        assert!(ArithmeticOperator.decode(&inputs, &parameters, 1e-9).is_err());
    }
}
