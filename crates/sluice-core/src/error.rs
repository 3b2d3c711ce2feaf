//! Common error type definitions.

use strum::{AsRefStr, IntoStaticStr};
use thiserror::Error;

/// Type alias for boxed dynamic errors that can be sent across threads.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync>;

/// Type alias for Results with our custom Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of errors that can occur while executing against drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    /// Configuration is missing, ambiguous or malformed.
    Configuration,
    /// A driver call failed.
    Provider,
    /// The driver does not support the requested operation.
    Unsupported,
    /// Execution was cancelled at a check-point.
    Cancelled,
    /// The connection or session is already closed.
    Closed,
    /// Reading an external resource failed.
    Io,
    /// Internal engine error.
    Internal,
}

/// A structured error type for sluice operations.
///
/// Provider errors may carry the offending statement and vendor error codes,
/// which error handlers use to decide whether a failure is recoverable.
#[derive(Debug, Error)]
#[error(
    "{}{}{}",
    AsRef::<str>::as_ref(kind),
    message.as_ref().map(|m| format!(": {m}")).unwrap_or_default(),
    location.as_ref().map(|l| format!(" (at {l})")).unwrap_or_default()
)]
pub struct Error {
    /// The kind of error that occurred.
    pub kind: ErrorKind,
    /// Optional error message.
    pub message: Option<String>,
    /// Optional source error.
    #[source]
    pub source: Option<BoxedError>,
    /// Statement that was being executed, if known.
    pub statement: Option<String>,
    /// Vendor-specific error codes (SQL states, numeric codes).
    pub codes: Vec<String>,
    /// Location of the element that raised the error.
    pub location: Option<String>,
}

impl Error {
    /// Creates a new error with the given kind.
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            source: None,
            statement: None,
            codes: Vec::new(),
            location: None,
        }
    }

    /// Adds a message to this error.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Adds a source error to this error.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Attaches the statement that failed.
    pub fn with_statement(mut self, statement: impl Into<String>) -> Self {
        self.statement = Some(statement.into());
        self
    }

    /// Attaches a vendor error code.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.codes.push(code.into());
        self
    }

    /// Attaches the element location, keeping the innermost one.
    pub fn with_location(mut self, location: impl ToString) -> Self {
        if self.location.is_none() {
            self.location = Some(location.to_string());
        }
        self
    }

    /// Creates a new configuration error.
    pub fn configuration() -> Self {
        Self::new(ErrorKind::Configuration)
    }

    /// Creates a new provider error.
    pub fn provider() -> Self {
        Self::new(ErrorKind::Provider)
    }

    /// Creates a new unsupported operation error.
    pub fn unsupported() -> Self {
        Self::new(ErrorKind::Unsupported)
    }

    /// Creates a new cancellation error.
    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled).with_message("execution cancelled")
    }

    /// Creates a new closed error.
    pub fn closed() -> Self {
        Self::new(ErrorKind::Closed)
    }

    /// Creates a new I/O error.
    pub fn io() -> Self {
        Self::new(ErrorKind::Io)
    }

    /// Creates a new internal error.
    pub fn internal() -> Self {
        Self::new(ErrorKind::Internal)
    }

    /// Returns the error kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the error kind as a string.
    pub fn kind_str(&self) -> &'static str {
        self.kind.into()
    }

    /// Returns true if this error is the cancellation signal.
    pub fn is_cancelled(&self) -> bool {
        self.kind == ErrorKind::Cancelled
    }

    /// Returns the message, or an empty string.
    pub fn message(&self) -> &str {
        self.message.as_deref().unwrap_or_default()
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::io().with_message(error.to_string()).with_source(error)
    }
}
