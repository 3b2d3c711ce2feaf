//! Prelude module for convenient imports.
//!
//! This module re-exports commonly used types for ergonomic imports:
//!
//! ```rust
//! use sluice_engine::prelude::*;
//! ```

pub use sluice_core::{
    CancellationToken, Connection, ConnectionParameters, Driver, Parameters, ParametersCallback,
    QueryCallback, Resource, Value,
};

pub use crate::config::{EtlConfig, ExecutorConfig, ExecutorConfigBuilder};
pub use crate::connection::DriverRegistry;
pub use crate::error::{EtlError, EtlResult};
pub use crate::etl::EtlExecutor;
pub use crate::progress::{ProgressIndicator, SilentProgress, TracingProgress};
pub use crate::statistics::{ExecutionStatistics, StatisticsCollector};
