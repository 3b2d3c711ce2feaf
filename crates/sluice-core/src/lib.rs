#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

//! # Sluice Core
//!
//! This crate defines the contract between the sluice execution engine and the
//! drivers it runs against. It carries no engine logic: everything here is
//! implemented by drivers or consumed by the engine.

/// Tracing target for driver-level operations.
pub const TRACING_TARGET_DRIVER: &str = "sluice_core::driver";

mod cancel;
mod connection;
mod dialect;
mod error;
mod parameters;
mod resource;
mod value;

pub use cancel::{CancellationToken, checkpoint};
pub use connection::{Connection, ConnectionParameters, Driver, QueryCallback};
pub use dialect::DialectIdentifier;
pub use error::{BoxedError, Error, ErrorKind, Result};
pub use parameters::{Parameters, ParametersCallback};
pub use resource::Resource;
pub use value::{Value, ValueStream};
