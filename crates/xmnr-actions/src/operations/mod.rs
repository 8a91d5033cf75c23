//! Concrete operation handlers.
//!
//! Driver-backed operations hand their parameters to the external test
//! driver and interpret the events it streams back. State store operations
//! run in-process against the recorded states of one device.

mod driver;
mod local;

pub use self::driver::DriverOperation;
pub use self::local::LocalOperation;
