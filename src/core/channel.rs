use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Element type carried by a channel's sample arrays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementType {
    Float,
    Bool,
    Events,
}

/// Kind of logical data stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelKind {
    Analog,
    Digital,
    Decoder,
    Operator,
    Math,
    Fft,
    Xy,
    Debug,
}

impl ChannelKind {
    /// Hardware channels are fixed for the lifetime of the registry
    pub fn is_hardware(&self) -> bool {
        matches!(self, ChannelKind::Analog | ChannelKind::Digital)
    }
}

/// Generation-checked handle into a [`ChannelRegistry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId {
    slot: u32,
    generation: u32,
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch{}.{}", self.slot, self.generation)
    }
}

/// Identity of one logical channel
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub name: String,
    /// Ordinal among channels of the same kind
    pub index: usize,
    pub kind: ChannelKind,
    pub element_type: ElementType,
    pub destructible: bool,
}

struct Slot {
    generation: u32,
    channel: Option<Channel>,
}

/// Arena owning every channel identity.
///
/// Hardware channels are created up front and can never be destroyed.
/// Processor outputs are created on demand and marked destructible.
pub struct ChannelRegistry {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

pub type SharedRegistry = Arc<RwLock<ChannelRegistry>>;

impl ChannelRegistry {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    /// Registry populated with `analog` analog channels (A, B, ...) and
    /// `digital` digital lines (D0, D1, ...)
    pub fn with_hardware(analog: usize, digital: usize) -> Self {
        let mut registry = Self::new();
        for i in 0..analog {
            let name = ((b'A' + i as u8) as char).to_string();
            registry.insert(name, ChannelKind::Analog, ElementType::Float, false);
        }
        for i in 0..digital {
            registry.insert(format!("D{}", i), ChannelKind::Digital, ElementType::Bool, false);
        }
        registry
    }

    pub fn into_shared(self) -> SharedRegistry {
        Arc::new(RwLock::new(self))
    }

    /// Create a destructible channel for a processor output
    pub fn create(
        &mut self,
        name: impl Into<String>,
        kind: ChannelKind,
        element_type: ElementType,
    ) -> ChannelId {
        self.insert(name.into(), kind, element_type, true)
    }

    fn insert(
        &mut self,
        name: String,
        kind: ChannelKind,
        element_type: ElementType,
        destructible: bool,
    ) -> ChannelId {
        let index = self.iter().filter(|(_, c)| c.kind == kind).count();
        let channel = Channel {
            name,
            index,
            kind,
            element_type,
            destructible,
        };

        if let Some(slot) = self.free.pop() {
            let entry = &mut self.slots[slot as usize];
            entry.channel = Some(channel);
            return ChannelId {
                slot,
                generation: entry.generation,
            };
        }

        self.slots.push(Slot {
            generation: 0,
            channel: Some(channel),
        });
        ChannelId {
            slot: (self.slots.len() - 1) as u32,
            generation: 0,
        }
    }

    /// Remove a destructible channel. Returns false for hardware channels
    /// and stale handles.
    pub fn destroy(&mut self, id: ChannelId) -> bool {
        let Some(entry) = self.slots.get_mut(id.slot as usize) else {
            return false;
        };
        if entry.generation != id.generation {
            return false;
        }
        match &entry.channel {
            Some(channel) if channel.destructible => {
                entry.channel = None;
                entry.generation = entry.generation.wrapping_add(1);
                self.free.push(id.slot);
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, id: ChannelId) -> Option<&Channel> {
        self.slots
            .get(id.slot as usize)
            .filter(|entry| entry.generation == id.generation)
            .and_then(|entry| entry.channel.as_ref())
    }

    pub fn contains(&self, id: ChannelId) -> bool {
        self.get(id).is_some()
    }

    pub fn is_destructible(&self, id: ChannelId) -> bool {
        self.get(id).map(|c| c.destructible).unwrap_or(false)
    }

    pub fn find(&self, name: &str) -> Option<ChannelId> {
        self.iter().find(|(_, c)| c.name == name).map(|(id, _)| id)
    }

    /// Live channels in slot order
    pub fn iter(&self) -> impl Iterator<Item = (ChannelId, &Channel)> {
        self.slots.iter().enumerate().filter_map(|(slot, entry)| {
            entry.channel.as_ref().map(|channel| {
                (
                    ChannelId {
                        slot: slot as u32,
                        generation: entry.generation,
                    },
                    channel,
                )
            })
        })
    }

    pub fn of_kind(&self, kind: ChannelKind) -> Vec<ChannelId> {
        self.iter()
            .filter(|(_, c)| c.kind == kind)
            .map(|(id, _)| id)
            .collect()
    }

    pub fn hardware(&self) -> Vec<ChannelId> {
        self.iter()
            .filter(|(_, c)| c.kind.is_hardware())
            .map(|(id, _)| id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::with_hardware(2, 8)
    }
}

/// Read the shared registry, recovering from a poisoned lock
pub fn read_registry(registry: &SharedRegistry) -> RwLockReadGuard<'_, ChannelRegistry> {
    registry.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub fn write_registry(registry: &SharedRegistry) -> RwLockWriteGuard<'_, ChannelRegistry> {
    registry.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
