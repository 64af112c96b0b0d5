pub mod mock;
pub mod traits;

pub use mock::{ScopeSimulationConfig, SimulatedScope};
pub use traits::{AcquisitionSource, SourceState};
