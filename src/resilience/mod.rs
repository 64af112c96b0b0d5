pub mod guarded;

pub use guarded::GuardedProcessor;
