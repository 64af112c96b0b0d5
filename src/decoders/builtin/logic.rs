use crate::core::{ChannelArray, ElementType};
use crate::decoders::{Decoder, DecoderDescriptor, DecoderInputs, DecoderKind, InputSlot, Parameters};
use crate::registry::{DecoderMetadata, ParameterSchema};
use anyhow::{bail, Result};
use serde_json::json;

/// Boolean gate over one or two digital operands. An unconnected B reads
/// as low.
#[derive(Debug, Default)]
pub struct LogicOperator;

fn create() -> Box<dyn Decoder> {
    Box::new(LogicOperator)
}

inventory::submit! {
    DecoderMetadata {
        id: "logic",
        name: "Logic",
        kind: DecoderKind::Operator,
        factory: create,
    }
}

impl Decoder for LogicOperator {
    fn descriptor(&self) -> DecoderDescriptor {
        DecoderDescriptor {
            id: "logic",
            name: "Logic",
            kind: DecoderKind::Operator,
            inputs: vec![
                InputSlot::required("A", ElementType::Bool),
                InputSlot::optional("B", ElementType::Bool),
            ],
            parameters: vec![ParameterSchema::new("operation", "string", json!("and"))],
            output: ElementType::Bool,
        }
    }

    fn decode(&mut self, inputs: &DecoderInputs, parameters: &Parameters, _sample_period: f64) -> Result<ChannelArray> {
        let a = inputs.bool("A")?;
        let b = inputs.bool("B")?;
        let gate: fn(bool, bool) -> bool = match parameters.str("operation", "and") {
            "and" => |x, y| x && y,
            "or" => |x, y| x || y,
            "xor" => |x, y| x ^ y,
            "not" => |x, _| !x,
            other => bail!("Unknown logic operation: {}", other),
        };
        Ok(ChannelArray::from(
            a.iter().zip(b).map(|(&x, &y)| gate(x, y)).collect::<Vec<_>>(),
        ))
    }
}
