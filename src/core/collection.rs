use super::acquisition::{RawAcquisition, ScopeBuffer};
use super::channel::{read_registry, ChannelId, SharedRegistry};
use super::data::{ChannelArray, ChannelData, ChannelDataSource};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

static NEXT_COLLECTION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CollectionError {
    #[error("Channel {channel} is not registered for {data_source:?} data")]
    UnregisteredChannel {
        data_source: ChannelDataSource,
        channel: ChannelId,
    },

    #[error("No {data_source:?} entry for channel {channel} to override")]
    UnknownEntry {
        data_source: ChannelDataSource,
        channel: ChannelId,
    },
}

type EntryKey = (ChannelDataSource, ChannelId);

struct CollectionState {
    /// Skeleton of legitimate sinks; `None` until a processor writes
    entries: HashMap<EntryKey, Option<ChannelData>>,
    trigger_adjustment: f64,
    trigger_adjustment_applied: bool,
}

/// All channel data belonging to one acquisition event.
///
/// Mutated by the processing thread during a single pass; read-only once
/// published. Every access goes through one collection-scoped lock.
pub struct ScopeDataCollection {
    id: u64,
    raw: Arc<RawAcquisition>,
    registry: SharedRegistry,
    state: Mutex<CollectionState>,
}

impl ScopeDataCollection {
    pub fn new(raw: Arc<RawAcquisition>, registry: SharedRegistry) -> Self {
        let mut entries = HashMap::new();
        for channel in read_registry(&registry).hardware() {
            for source in ChannelDataSource::SCOPE {
                entries.insert((source, channel), None);
            }
        }

        Self {
            id: NEXT_COLLECTION_ID.fetch_add(1, Ordering::Relaxed),
            raw,
            registry,
            state: Mutex::new(CollectionState {
                entries,
                trigger_adjustment: 0.0,
                trigger_adjustment_applied: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CollectionState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Unique per collection; used for "already processed" checks
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn raw(&self) -> &RawAcquisition {
        &self.raw
    }

    pub fn update_timestamp(&self) -> u64 {
        self.raw.update_timestamp
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    /// Device-supplied array, never processor output
    pub fn get_unprocessed_data(&self, buffer: ScopeBuffer, channel: ChannelId) -> Option<ChannelData> {
        let _guard = self.lock();
        self.raw.data(buffer, channel).cloned()
    }

    /// Processor output if set, else the raw buffer for scope-native sources
    pub fn get_data(&self, source: ChannelDataSource, channel: ChannelId) -> Option<ChannelData> {
        let state = self.lock();
        if let Some(Some(data)) = state.entries.get(&(source, channel)) {
            return Some(data.clone());
        }
        ScopeBuffer::from_source(source).and_then(|buffer| self.raw.data(buffer, channel).cloned())
    }

    /// Full acquisition once completely fetched, otherwise the viewport.
    /// The overview buffer is never considered.
    pub fn get_best_data(&self, channel: ChannelId) -> Option<ChannelData> {
        if self.raw.full_acquisition_complete() {
            if let Some(data) = self.get_data(ChannelDataSource::Acquisition, channel) {
                return Some(data);
            }
        }
        self.get_data(ChannelDataSource::Viewport, channel)
    }

    fn is_legitimate_sink(&self, state: &CollectionState, key: EntryKey) -> bool {
        !key.0.is_scope_native()
            || state.entries.contains_key(&key)
            || read_registry(&self.registry).is_destructible(key.1)
    }

    /// Register derived data for `(source, channel)`
    pub fn set_data(
        &self,
        source: ChannelDataSource,
        channel: ChannelId,
        array: impl Into<ChannelArray>,
    ) -> Result<ChannelData, CollectionError> {
        let mut state = self.lock();
        if !self.is_legitimate_sink(&state, (source, channel)) {
            return Err(CollectionError::UnregisteredChannel {
                data_source: source,
                channel,
            });
        }

        let (sample_period, time_offset, partial) = ScopeBuffer::from_source(source)
            .and_then(|buffer| self.raw.buffer(buffer))
            .map(|b| (b.sample_period, b.time_offset, b.partial))
            .unwrap_or((0.0, 0.0, false));

        let data = ChannelData::new(source, channel, array.into(), partial, sample_period, time_offset);
        state.entries.insert((source, channel), Some(data.clone()));
        Ok(data)
    }

    /// Replace the array behind `existing`, keeping its key, partial flag
    /// and timing
    pub fn override_data(
        &self,
        existing: &ChannelData,
        array: impl Into<ChannelArray>,
    ) -> Result<ChannelData, CollectionError> {
        let key = (existing.source, existing.channel);
        let mut state = self.lock();
        if !self.is_legitimate_sink(&state, key) {
            return Err(CollectionError::UnknownEntry {
                data_source: existing.source,
                channel: existing.channel,
            });
        }

        let data = existing.with_array(array.into());
        state.entries.insert(key, Some(data.clone()));
        Ok(data)
    }

    /// Channels holding processor output for `source`
    pub fn derived_channels(&self, source: ChannelDataSource) -> Vec<ChannelId> {
        let state = self.lock();
        let mut channels: Vec<ChannelId> = state
            .entries
            .iter()
            .filter(|((s, _), d)| *s == source && d.is_some())
            .map(|((_, c), _)| *c)
            .collect();
        channels.sort();
        channels
    }

    /// Sub-sample trigger correction in seconds; exactly 0.0 means "not found"
    pub fn trigger_adjustment(&self) -> f64 {
        self.lock().trigger_adjustment
    }

    pub fn trigger_adjustment_applied(&self) -> bool {
        self.lock().trigger_adjustment_applied
    }

    pub fn set_trigger_adjustment(&self, adjustment: f64) {
        let mut state = self.lock();
        state.trigger_adjustment = adjustment;
        state.trigger_adjustment_applied = adjustment != 0.0;
    }
}

impl std::fmt::Debug for ScopeDataCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeDataCollection")
            .field("id", &self.id)
            .field("update_timestamp", &self.raw.update_timestamp)
            .field("trigger_adjustment", &self.trigger_adjustment())
            .finish()
    }
}
