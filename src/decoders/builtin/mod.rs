//! Plugins linked into every build, registered through `inventory`

pub mod arithmetic;
pub mod i2c;
pub mod logic;
pub mod spi;

pub use arithmetic::ArithmeticOperator;
pub use i2c::I2cDecoder;
pub use logic::LogicOperator;
pub use spi::SpiDecoder;
