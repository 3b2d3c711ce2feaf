#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

pub mod config;
pub mod connection;
pub mod context;
pub mod element;
mod error;
mod etl;
mod executor;
pub mod expression;
mod interceptor;
mod location;
pub mod progress;
mod session;
pub mod statistics;

#[doc(hidden)]
pub mod prelude;

pub use error::{EtlError, EtlResult};
pub use etl::EtlExecutor;
pub use location::Location;
pub use session::Session;

/// Tracing target for run lifecycle events.
pub const TRACING_TARGET: &str = "sluice_engine";

/// Tracing target for session setup and teardown.
pub const TRACING_TARGET_SESSION: &str = "sluice_engine::session";

/// Tracing target for element execution.
pub const TRACING_TARGET_ELEMENT: &str = "sluice_engine::element";

/// Tracing target for connection lifecycle.
pub const TRACING_TARGET_CONNECTION: &str = "sluice_engine::connection";
