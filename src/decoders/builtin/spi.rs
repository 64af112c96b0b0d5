use crate::core::{ChannelArray, DecoderEvent, ElementType};
use crate::decoders::{Decoder, DecoderDescriptor, DecoderInputs, DecoderKind, InputSlot, Parameters};
use crate::registry::{DecoderMetadata, ParameterSchema};
use anyhow::Result;
use serde_json::json;

/// Four-wire serial decoder. MISO and chip select are optional; an
/// unconnected chip select reads as always low.
#[derive(Debug, Default)]
pub struct SpiDecoder;

fn create() -> Box<dyn Decoder> {
    Box::new(SpiDecoder)
}

inventory::submit! {
    DecoderMetadata {
        id: "spi",
        name: "SPI",
        kind: DecoderKind::Decoder,
        factory: create,
    }
}

impl Decoder for SpiDecoder {
    fn descriptor(&self) -> DecoderDescriptor {
        DecoderDescriptor {
            id: "spi",
            name: "SPI",
            kind: DecoderKind::Decoder,
            inputs: vec![
                InputSlot::required("SCLK", ElementType::Bool).with_toggle_rate(1e6),
                InputSlot::required("MOSI", ElementType::Bool),
                InputSlot::optional("MISO", ElementType::Bool),
                InputSlot::optional("CS", ElementType::Bool),
            ],
            parameters: vec![
                ParameterSchema::new("cpol", "u64", json!(0)).with_range(0.0, 1.0),
                ParameterSchema::new("cpha", "u64", json!(0)).with_range(0.0, 1.0),
                ParameterSchema::new("bits", "u64", json!(8)).with_range(1.0, 32.0),
                ParameterSchema::new("cs_active_low", "bool", json!(true)),
            ],
            output: ElementType::Events,
        }
    }

    fn decode(&mut self, inputs: &DecoderInputs, parameters: &Parameters, _sample_period: f64) -> Result<ChannelArray> {
        let sclk = inputs.bool("SCLK")?;
        let mosi = inputs.bool("MOSI")?;
        let miso = inputs.bool("MISO")?;
        let cs = inputs.bool("CS")?;

        let cpol = parameters.u64("cpol", 0) == 1;
        let cpha = parameters.u64("cpha", 0) == 1;
        let bits = parameters.u64("bits", 8).clamp(1, 32) as u32;
        let active_low = parameters.bool("cs_active_low", true);
        // Modes 0 and 3 sample on the rising edge
        let sample_on_rising = cpol == cpha;

        let len = inputs.run_length();
        let mut events = Vec::new();
        let (mut count, mut mosi_word, mut miso_word, mut start) = (0u32, 0u64, 0u64, 0usize);

        for i in 1..len {
            let selected = cs[i] != active_low;
            if !selected {
                count = 0;
                continue;
            }

            let edge = if sample_on_rising {
                !sclk[i - 1] && sclk[i]
            } else {
                sclk[i - 1] && !sclk[i]
            };
            if !edge {
                continue;
            }

            if count == 0 {
                start = i;
                mosi_word = 0;
                miso_word = 0;
            }
            mosi_word = (mosi_word << 1) | mosi[i] as u64;
            miso_word = (miso_word << 1) | miso[i] as u64;
            count += 1;

            if count == bits {
                events.push(
                    DecoderEvent::new(start, i, format!("0x{:02X} / 0x{:02X}", mosi_word, miso_word))
                        .with_value(mosi_word),
                );
                count = 0;
            }
        }

        Ok(ChannelArray::from(events))
    }
}
