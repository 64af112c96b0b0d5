use super::channel::{ChannelId, ElementType};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_VERSION: AtomicU64 = AtomicU64::new(1);

fn next_version() -> u64 {
    NEXT_VERSION.fetch_add(1, Ordering::Relaxed)
}

/// Where an array of samples came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelDataSource {
    /// Currently displayed window
    Viewport,
    /// Complete capture for one trigger event
    Acquisition,
    /// Low-resolution preview
    Overview,
    /// ETS-reconstructed voltages
    EtsVoltages,
    /// Per-sample timestamps matching [`ChannelDataSource::EtsVoltages`]
    EtsTimestamps,
}

impl ChannelDataSource {
    pub const SCOPE: [ChannelDataSource; 3] = [
        ChannelDataSource::Viewport,
        ChannelDataSource::Acquisition,
        ChannelDataSource::Overview,
    ];

    /// True for sources backed by a device acquisition buffer
    pub fn is_scope_native(&self) -> bool {
        matches!(
            self,
            ChannelDataSource::Viewport | ChannelDataSource::Acquisition | ChannelDataSource::Overview
        )
    }
}

/// One decoded protocol event spanning a range of samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecoderEvent {
    pub start: usize,
    pub end: usize,
    pub label: String,
    pub value: Option<u64>,
}

impl DecoderEvent {
    pub fn new(start: usize, end: usize, label: impl Into<String>) -> Self {
        Self {
            start,
            end,
            label: label.into(),
            value: None,
        }
    }

    pub fn with_value(mut self, value: u64) -> Self {
        self.value = Some(value);
        self
    }
}

/// Shared, immutable sample array
#[derive(Debug, Clone)]
pub enum ChannelArray {
    Float(Arc<[f64]>),
    Bool(Arc<[bool]>),
    Events(Arc<[DecoderEvent]>),
}

impl ChannelArray {
    pub fn element_type(&self) -> ElementType {
        match self {
            ChannelArray::Float(_) => ElementType::Float,
            ChannelArray::Bool(_) => ElementType::Bool,
            ChannelArray::Events(_) => ElementType::Events,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ChannelArray::Float(a) => a.len(),
            ChannelArray::Bool(a) => a.len(),
            ChannelArray::Events(a) => a.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_float(&self) -> Option<&[f64]> {
        match self {
            ChannelArray::Float(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<&[bool]> {
        match self {
            ChannelArray::Bool(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_events(&self) -> Option<&[DecoderEvent]> {
        match self {
            ChannelArray::Events(a) => Some(a),
            _ => None,
        }
    }

    /// Array of `len` default values (0.0 / false / no events)
    pub fn default_of(element_type: ElementType, len: usize) -> Self {
        match element_type {
            ElementType::Float => ChannelArray::Float(vec![0.0; len].into()),
            ElementType::Bool => ChannelArray::Bool(vec![false; len].into()),
            ElementType::Events => ChannelArray::Events(Vec::new().into()),
        }
    }
}

impl From<Vec<f64>> for ChannelArray {
    fn from(v: Vec<f64>) -> Self {
        ChannelArray::Float(v.into())
    }
}

impl From<Vec<bool>> for ChannelArray {
    fn from(v: Vec<bool>) -> Self {
        ChannelArray::Bool(v.into())
    }
}

impl From<Vec<DecoderEvent>> for ChannelArray {
    fn from(v: Vec<DecoderEvent>) -> Self {
        ChannelArray::Events(v.into())
    }
}

/// Immutable samples of one channel from one source.
///
/// Every instance gets a fresh `version`; two values hold "the same data"
/// only when their versions match, regardless of array contents.
#[derive(Debug, Clone)]
pub struct ChannelData {
    pub source: ChannelDataSource,
    pub channel: ChannelId,
    pub array: ChannelArray,
    pub partial: bool,
    pub sample_period: f64,
    pub time_offset: f64,
    version: u64,
}

impl ChannelData {
    pub fn new(
        source: ChannelDataSource,
        channel: ChannelId,
        array: ChannelArray,
        partial: bool,
        sample_period: f64,
        time_offset: f64,
    ) -> Self {
        Self {
            source,
            channel,
            array,
            partial,
            sample_period,
            time_offset,
            version: next_version(),
        }
    }

    /// Same key and metadata, new array and version
    pub fn with_array(&self, array: ChannelArray) -> Self {
        Self::new(
            self.source,
            self.channel,
            array,
            self.partial,
            self.sample_period,
            self.time_offset,
        )
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn same_data(&self, other: &ChannelData) -> bool {
        self.version == other.version
    }

    pub fn element_type(&self) -> ElementType {
        self.array.element_type()
    }

    pub fn len(&self) -> usize {
        self.array.len()
    }

    pub fn is_empty(&self) -> bool {
        self.array.is_empty()
    }
}
