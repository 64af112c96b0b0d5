pub mod metadata;

pub use metadata::{
    available_decoders, create_decoder, DecoderFactory, DecoderMetadata, ParameterSchema,
};
