use crate::core::{ChannelArray, DecoderEvent, ElementType};
use crate::decoders::{Decoder, DecoderDescriptor, DecoderInputs, DecoderKind, InputSlot, Parameters};
use crate::registry::DecoderMetadata;
use anyhow::Result;

/// Two-wire bus decoder emitting start, address, data, ack and stop events
#[derive(Debug, Default)]
pub struct I2cDecoder;

fn create() -> Box<dyn Decoder> {
    Box::new(I2cDecoder)
}

inventory::submit! {
    DecoderMetadata {
        id: "i2c",
        name: "I2C",
        kind: DecoderKind::Decoder,
        factory: create,
    }
}

#[derive(Default)]
struct Frame {
    in_transfer: bool,
    address_phase: bool,
    bits: u8,
    value: u16,
    byte_start: usize,
}

impl Frame {
    fn restart(&mut self) {
        self.in_transfer = true;
        self.address_phase = true;
        self.bits = 0;
        self.value = 0;
    }
}

impl Decoder for I2cDecoder {
    fn descriptor(&self) -> DecoderDescriptor {
        DecoderDescriptor {
            id: "i2c",
            name: "I2C",
            kind: DecoderKind::Decoder,
            inputs: vec![
                InputSlot::required("SDA", ElementType::Bool),
                InputSlot::required("SCL", ElementType::Bool).with_toggle_rate(100e3),
            ],
            parameters: Vec::new(),
            output: ElementType::Events,
        }
    }

    fn decode(&mut self, inputs: &DecoderInputs, _parameters: &Parameters, _sample_period: f64) -> Result<ChannelArray> {
        let sda = inputs.bool("SDA")?;
        let scl = inputs.bool("SCL")?;
        let mut events = Vec::new();
        let mut frame = Frame::default();

        for i in 1..sda.len().min(scl.len()) {
            let clock_high = scl[i] && scl[i - 1];

            if clock_high && sda[i - 1] && !sda[i] {
                events.push(DecoderEvent::new(i, i, if frame.in_transfer { "Sr" } else { "S" }));
                frame.restart();
                continue;
            }
            if clock_high && !sda[i - 1] && sda[i] {
                events.push(DecoderEvent::new(i, i, "P"));
                frame = Frame::default();
                continue;
            }
            if !frame.in_transfer || scl[i - 1] || !scl[i] {
                continue;
            }

            // Rising clock edge: sample a bit
            if frame.bits == 0 {
                frame.byte_start = i;
            }
            if frame.bits < 8 {
                frame.value = (frame.value << 1) | sda[i] as u16;
                frame.bits += 1;
                continue;
            }

            let byte = frame.value as u64;
            let event = if frame.address_phase {
                let direction = if byte & 1 == 1 { "R" } else { "W" };
                DecoderEvent::new(frame.byte_start, i, format!("Addr 0x{:02X} {}", byte >> 1, direction))
                    .with_value(byte >> 1)
            } else {
                DecoderEvent::new(frame.byte_start, i, format!("0x{:02X}", byte)).with_value(byte)
            };
            events.push(event);
            events.push(DecoderEvent::new(i, i, if sda[i] { "NACK" } else { "ACK" }));

            frame.address_phase = false;
            frame.bits = 0;
            frame.value = 0;
        }

        Ok(ChannelArray::from(events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::mock::i2c_lines;

    #[test]
    fn test_decodes_address_and_data() {
        let (sda, scl) = i2c_lines(&[0x50 << 1, 0xA5], 0);
        let mut inputs = DecoderInputs::new(sda.len());
        inputs.insert("SDA", ChannelArray::from(sda));
        inputs.insert("SCL", ChannelArray::from(scl));

        let output = I2cDecoder
            .decode(&inputs, &Parameters::default(), 1e-6)
            .unwrap();
        let labels: Vec<&str> = output
            .as_events()
            .unwrap()
            .iter()
            .map(|e| e.label.as_str())
            .collect();
        assert_eq!(labels, vec!["S", "Addr 0x50 W", "ACK", "0xA5", "ACK", "P"]);
    }

    #[test]
    fn test_idle_bus_yields_no_events() {
        let mut inputs = DecoderInputs::new(16);
        inputs.insert("SDA", ChannelArray::from(vec![true; 16]));
        inputs.insert("SCL", ChannelArray::from(vec![true; 16]));
        let output = I2cDecoder.decode(&inputs, &Parameters::default(), 1e-6).unwrap();
        assert!(output.is_empty());
    }
}
