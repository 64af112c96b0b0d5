use super::coercion::transitions;
use super::plugin::InputSlot;
use crate::core::{ChannelId, ChannelKind, ChannelRegistry, ElementType, ScopeDataCollection};
use std::cmp::Reverse;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BindingError {
    #[error("No channel available for input {slot}")]
    NoCandidate { slot: String },

    #[error("Decoder has no input named {slot}")]
    UnknownSlot { slot: String },

    #[error("Input {slot} is not nullable")]
    NotNullable { slot: String },
}

/// A channel that could be wired to a decoder input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelCandidate {
    pub channel: ChannelId,
    pub element_type: ElementType,
    /// Level changes seen in the latest capture, digital data only
    pub activity: Option<usize>,
}

/// Channels currently able to feed a decoder, in registry order.
///
/// Hardware channels count as enabled when `collection` carries data for
/// them (or when there is no collection yet). Decoder, operator and math
/// outputs are always offered.
pub fn gather_candidates(
    registry: &ChannelRegistry,
    collection: Option<&ScopeDataCollection>,
    exclude: &[ChannelId],
) -> Vec<ChannelCandidate> {
    registry
        .iter()
        .filter(|(id, _)| !exclude.contains(id))
        .filter_map(|(id, channel)| {
            let data = collection.and_then(|c| c.get_best_data(id));
            let enabled = match channel.kind {
                ChannelKind::Analog | ChannelKind::Digital => collection.is_none() || data.is_some(),
                ChannelKind::Decoder | ChannelKind::Operator | ChannelKind::Math => true,
                ChannelKind::Fft | ChannelKind::Xy | ChannelKind::Debug => false,
            };
            enabled.then(|| ChannelCandidate {
                channel: id,
                element_type: channel.element_type,
                activity: data.as_ref().and_then(|d| d.array.as_bool()).map(transitions),
            })
        })
        .collect()
}

/// Order in which slots claim channels: mandatory slots with an expected
/// toggle rate (fastest first), other mandatory slots, then nullable ones
pub fn binding_order(slots: &[InputSlot]) -> Vec<usize> {
    let mut scored: Vec<usize> = (0..slots.len())
        .filter(|&i| !slots[i].nullable && slots[i].toggle_rate.is_some())
        .collect();
    scored.sort_by(|&a, &b| {
        let rate = |i: usize| slots[i].toggle_rate.unwrap_or(0.0);
        rate(b).total_cmp(&rate(a))
    });

    let unscored = (0..slots.len()).filter(|&i| !slots[i].nullable && slots[i].toggle_rate.is_none());
    let nullable = (0..slots.len()).filter(|&i| slots[i].nullable);
    scored.into_iter().chain(unscored).chain(nullable).collect()
}

/// Assign candidates to slots; the result is indexed like `slots`
pub fn bind_slots(
    slots: &[InputSlot],
    candidates: &[ChannelCandidate],
) -> Result<Vec<Option<ChannelId>>, BindingError> {
    let mut bound = vec![None; slots.len()];
    let mut consumed: Vec<ChannelId> = Vec::new();

    for index in binding_order(slots) {
        let slot = &slots[index];
        let mut matching: Vec<&ChannelCandidate> = candidates
            .iter()
            .filter(|c| c.element_type == slot.element_type)
            .collect();
        // Compared against the total slot count, not this slot's need
        if slot.element_type == ElementType::Bool && matching.len() < slots.len() {
            matching.extend(candidates.iter().filter(|c| c.element_type == ElementType::Float));
        }
        matching.retain(|c| !consumed.contains(&c.channel));
        matching.sort_by_key(|c| Reverse(c.activity.unwrap_or(0)));

        match matching.first() {
            Some(candidate) => {
                bound[index] = Some(candidate.channel);
                consumed.push(candidate.channel);
            }
            None if slot.nullable => bound[index] = None,
            None => {
                return Err(BindingError::NoCandidate {
                    slot: slot.name.clone(),
                })
            }
        }
    }
    Ok(bound)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(registry: &ChannelRegistry, name: &str, activity: Option<usize>) -> ChannelCandidate {
        let id = registry.find(name).unwrap();
        ChannelCandidate {
            channel: id,
            element_type: registry.get(id).unwrap().element_type,
            activity,
        }
    }

    fn i2c_slots() -> Vec<InputSlot> {
        vec![
            InputSlot::required("SDA", ElementType::Bool),
            InputSlot::required("SCL", ElementType::Bool).with_toggle_rate(100e3),
        ]
    }

    #[test]
    fn test_order_puts_rated_then_mandatory_then_nullable() {
        let slots = vec![
            InputSlot::optional("CS", ElementType::Bool),
            InputSlot::required("MOSI", ElementType::Bool),
            InputSlot::required("SCLK", ElementType::Bool).with_toggle_rate(1e6),
            InputSlot::required("SLOW", ElementType::Bool).with_toggle_rate(1e3),
        ];
        assert_eq!(binding_order(&slots), vec![2, 3, 1, 0]);
    }

    #[test]
    fn test_most_active_channel_goes_to_clock() {
        let registry = ChannelRegistry::with_hardware(0, 3);
        let candidates = vec![
            candidate(&registry, "D0", Some(3)),
            candidate(&registry, "D1", Some(40)),
            candidate(&registry, "D2", Some(10)),
        ];
        let bound = bind_slots(&i2c_slots(), &candidates).unwrap();
        assert_eq!(bound[1], registry.find("D1"));
        assert_eq!(bound[0], registry.find("D2"));
    }

    #[test]
    fn test_ties_keep_arrival_order() {
        let registry = ChannelRegistry::with_hardware(0, 2);
        let candidates = vec![candidate(&registry, "D0", None), candidate(&registry, "D1", None)];
        let bound = bind_slots(&i2c_slots(), &candidates).unwrap();
        assert_eq!(bound[1], registry.find("D0"));
        assert_eq!(bound[0], registry.find("D1"));
    }

    #[test]
    fn test_bool_slots_fall_back_to_analog() {
        let registry = ChannelRegistry::with_hardware(2, 1);
        let candidates = vec![
            candidate(&registry, "A", None),
            candidate(&registry, "B", None),
            candidate(&registry, "D0", Some(5)),
        ];
        let bound = bind_slots(&i2c_slots(), &candidates).unwrap();
        assert_eq!(bound[1], registry.find("D0"));
        assert_eq!(bound[0], registry.find("A"));
    }

    #[test]
    fn test_missing_mandatory_fails_and_nullable_stays_empty() {
        let registry = ChannelRegistry::with_hardware(0, 1);
        let candidates = vec![candidate(&registry, "D0", None)];
        assert_eq!(
            bind_slots(&i2c_slots(), &candidates),
            Err(BindingError::NoCandidate {
                slot: "SDA".to_string()
            })
        );

        let slots = vec![
            InputSlot::required("IN", ElementType::Bool),
            InputSlot::optional("EN", ElementType::Bool),
        ];
        let bound = bind_slots(&slots, &candidates).unwrap();
        assert_eq!(bound, vec![registry.find("D0"), None]);
    }
}
