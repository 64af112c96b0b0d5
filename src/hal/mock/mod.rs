pub mod scope;

pub use scope::{i2c_lines, ScopeSimulationConfig, SimulatedScope};
