//! Run configuration.
//!
//! - [`EtlConfig`]: the declarative description of a run (properties,
//!   connections and the element tree), loaded from JSON
//! - [`ExecutorConfig`]: per-run settings of the executor

mod executor;
mod model;

pub use executor::{ExecutorConfig, ExecutorConfigBuilder, ExecutorConfigBuilderError};
pub use model::{
    ConnectionDecl, Content, ContentPart, DialectDecl, ElementDecl, ErrorPolicy, EtlConfig,
    OnErrorDecl, QueryDecl, ScriptDecl,
};
