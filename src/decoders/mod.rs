pub mod binding;
pub mod builtin;
pub mod coercion;
pub mod engine;
pub mod plugin;

pub use binding::{BindingError, ChannelCandidate};
pub use engine::DecoderProcessor;
pub use plugin::{
    Decoder, DecoderDescriptor, DecoderInputs, DecoderKind, InputSlot, Parameters,
};
