#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod memory;

pub use memory::{JournalEntry, MemoryConnection, MemoryDatabase, MemoryDriver};

/// Tracing target for the in-memory driver.
pub const TRACING_TARGET: &str = "sluice_test::memory";
