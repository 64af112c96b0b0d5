pub mod acquisition;
pub mod channel;
pub mod collection;
pub mod data;
pub mod processor;

pub use acquisition::{
    BufferData, ChannelResolution, RawAcquisition, ScopeBuffer, TriggerEdge, TriggerMode,
    TriggerSettings,
};
pub use channel::{Channel, ChannelId, ChannelKind, ChannelRegistry, ElementType, SharedRegistry};
pub use collection::{CollectionError, ScopeDataCollection};
pub use data::{ChannelArray, ChannelData, ChannelDataSource, DecoderEvent};
pub use processor::{Processor, ProcessorStage};
