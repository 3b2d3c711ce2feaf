//! Connection dialect identification.

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Identifies the language flavour a connection speaks.
///
/// Used to select between dialect-specific variants of the same content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Display, Serialize, Deserialize)]
#[display("{name}{}", version.as_ref().map(|v| format!(" {v}")).unwrap_or_default())]
pub struct DialectIdentifier {
    /// Dialect name, e.g. `PostgreSQL`.
    pub name: String,
    /// Dialect version, if the driver reports one.
    pub version: Option<String>,
}

impl DialectIdentifier {
    /// Creates a dialect identifier without version.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
        }
    }

    /// Sets the dialect version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Returns the version or an empty string.
    pub fn version_str(&self) -> &str {
        self.version.as_deref().unwrap_or_default()
    }
}
