use super::channel::ChannelId;
use super::data::{ChannelArray, ChannelData, ChannelDataSource};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Granularity of a device acquisition buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScopeBuffer {
    Viewport,
    Acquisition,
    Overview,
}

impl ScopeBuffer {
    pub fn source(&self) -> ChannelDataSource {
        match self {
            ScopeBuffer::Viewport => ChannelDataSource::Viewport,
            ScopeBuffer::Acquisition => ChannelDataSource::Acquisition,
            ScopeBuffer::Overview => ChannelDataSource::Overview,
        }
    }

    pub fn from_source(source: ChannelDataSource) -> Option<Self> {
        match source {
            ChannelDataSource::Viewport => Some(ScopeBuffer::Viewport),
            ChannelDataSource::Acquisition => Some(ScopeBuffer::Acquisition),
            ChannelDataSource::Overview => Some(ScopeBuffer::Overview),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerMode {
    Edge,
    Pulse,
    Timeout,
    Digital,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerEdge {
    Rising,
    Falling,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriggerSettings {
    pub mode: TriggerMode,
    /// Analog channel the trigger fires on; `None` for digital triggers
    pub source: Option<ChannelId>,
    pub level: f64,
    pub edge: TriggerEdge,
}

impl Default for TriggerSettings {
    fn default() -> Self {
        Self {
            mode: TriggerMode::Edge,
            source: None,
            level: 0.0,
            edge: TriggerEdge::Rising,
        }
    }
}

/// Input range and gain setting of an analog channel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelResolution {
    pub min: f64,
    pub max: f64,
    pub gain_setting: u32,
}

impl ChannelResolution {
    pub fn span(&self) -> f64 {
        self.max - self.min
    }
}

/// Samples of one buffer granularity, shared timing for every channel
#[derive(Debug, Clone)]
pub struct BufferData {
    pub sample_period: f64,
    pub time_offset: f64,
    pub partial: bool,
    channels: HashMap<ChannelId, ChannelData>,
}

impl BufferData {
    pub fn new(sample_period: f64, time_offset: f64) -> Self {
        Self {
            sample_period,
            time_offset,
            partial: false,
            channels: HashMap::new(),
        }
    }

    pub fn get(&self, channel: ChannelId) -> Option<&ChannelData> {
        self.channels.get(&channel)
    }

    pub fn channels(&self) -> impl Iterator<Item = ChannelId> + '_ {
        self.channels.keys().copied()
    }

    /// Number of samples per channel
    pub fn sample_count(&self) -> usize {
        self.channels.values().map(|d| d.len()).max().unwrap_or(0)
    }
}

/// One capture as delivered by the device layer
#[derive(Debug, Clone)]
pub struct RawAcquisition {
    /// Monotonically increasing per delivered capture
    pub update_timestamp: u64,
    buffers: HashMap<ScopeBuffer, BufferData>,
    pub holdoff_samples: i64,
    /// Holdoff in seconds
    pub holdoff: f64,
    pub acquisition_samples: usize,
    /// 0.0..=1.0; full acquisition is usable from 1.0
    pub fetch_progress: f64,
    pub rolling: bool,
    pub trigger: TriggerSettings,
    resolution: HashMap<ChannelId, ChannelResolution>,
}

impl RawAcquisition {
    pub fn new(update_timestamp: u64) -> Self {
        Self {
            update_timestamp,
            buffers: HashMap::new(),
            holdoff_samples: 0,
            holdoff: 0.0,
            acquisition_samples: 0,
            fetch_progress: 0.0,
            rolling: false,
            trigger: TriggerSettings::default(),
            resolution: HashMap::new(),
        }
    }

    /// Declare a buffer's timing; channels are added with [`Self::insert`]
    pub fn with_buffer(mut self, buffer: ScopeBuffer, sample_period: f64, time_offset: f64) -> Self {
        self.buffers
            .insert(buffer, BufferData::new(sample_period, time_offset));
        self
    }

    pub fn insert(&mut self, buffer: ScopeBuffer, channel: ChannelId, array: impl Into<ChannelArray>) {
        let entry = self
            .buffers
            .entry(buffer)
            .or_insert_with(|| BufferData::new(0.0, 0.0));
        let data = ChannelData::new(
            buffer.source(),
            channel,
            array.into(),
            entry.partial,
            entry.sample_period,
            entry.time_offset,
        );
        entry.channels.insert(channel, data);
    }

    /// Mark a buffer as partially fetched; applies to channels inserted afterwards
    pub fn set_partial(&mut self, buffer: ScopeBuffer, partial: bool) {
        if let Some(entry) = self.buffers.get_mut(&buffer) {
            entry.partial = partial;
        }
    }

    pub fn set_resolution(&mut self, channel: ChannelId, resolution: ChannelResolution) {
        self.resolution.insert(channel, resolution);
    }

    pub fn buffer(&self, buffer: ScopeBuffer) -> Option<&BufferData> {
        self.buffers.get(&buffer)
    }

    pub fn data(&self, buffer: ScopeBuffer, channel: ChannelId) -> Option<&ChannelData> {
        self.buffers.get(&buffer).and_then(|b| b.get(channel))
    }

    pub fn resolution(&self, channel: ChannelId) -> Option<ChannelResolution> {
        self.resolution.get(&channel).copied()
    }

    pub fn sample_period(&self, buffer: ScopeBuffer) -> Option<f64> {
        self.buffers.get(&buffer).map(|b| b.sample_period)
    }

    pub fn time_offset(&self, buffer: ScopeBuffer) -> Option<f64> {
        self.buffers.get(&buffer).map(|b| b.time_offset)
    }

    pub fn full_acquisition_complete(&self) -> bool {
        self.fetch_progress >= 1.0
    }
}
