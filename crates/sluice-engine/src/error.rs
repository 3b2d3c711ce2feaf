//! Run-level error types.

use sluice_core::{Error, ErrorKind};
use thiserror::Error;

/// Result type for ETL runs.
pub type EtlResult<T> = Result<T, EtlError>;

/// Errors that end an ETL run.
#[derive(Debug, Error)]
pub enum EtlError {
    /// The configuration is invalid. Raised before any connection is opened.
    #[error("invalid configuration: {0}")]
    Configuration(#[source] Error),

    /// The run was cancelled and every connection rolled back.
    #[error("execution cancelled")]
    Cancelled,

    /// An element failed and the run was rolled back.
    #[error("execution failed: {source}")]
    Execution {
        /// Location of the innermost failing element, if known.
        location: Option<String>,
        /// The failure.
        source: Error,
    },
}

impl EtlError {
    /// Returns true if the run was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns the location of the failing element, if known.
    pub fn location(&self) -> Option<&str> {
        match self {
            Self::Configuration(error) => error.location.as_deref(),
            Self::Cancelled => None,
            Self::Execution { location, .. } => location.as_deref(),
        }
    }
}

impl From<Error> for EtlError {
    fn from(error: Error) -> Self {
        match error.kind() {
            ErrorKind::Cancelled => Self::Cancelled,
            ErrorKind::Configuration => Self::Configuration(error),
            _ => Self::Execution {
                location: error.location.clone(),
                source: error,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_are_classified_by_kind() {
        assert!(EtlError::from(Error::cancelled()).is_cancelled());
        assert!(matches!(
            EtlError::from(Error::configuration()),
            EtlError::Configuration(_)
        ));

        let error = EtlError::from(Error::provider().with_location("/etl[1]/script[1]"));
        assert_eq!(error.location(), Some("/etl[1]/script[1]"));
    }
}
