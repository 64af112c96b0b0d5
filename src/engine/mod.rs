pub mod pipeline;
pub mod runtime;
pub mod state;

pub use pipeline::{ProcessorPipeline, PublishedCollection, Recorder};
pub use runtime::{AcquisitionRuntime, RuntimeStatus};
pub use state::PipelineState;
