//! Connection lifecycle.
//!
//! - [`DriverRegistry`]: drivers available to a run, by name
//! - [`ConnectionManager`]: one declared connection, its lazily opened
//!   primary connection and its transaction control

mod manager;
mod registry;

pub use manager::ConnectionManager;
pub use registry::DriverRegistry;
