pub mod config;
pub mod core;
pub mod decoders;
pub mod engine;
pub mod hal;
pub mod observability;
pub mod processors;
pub mod registry;
pub mod resilience;
