//! Driver and connection SPI.
//!
//! A [`Driver`] opens [`Connection`]s from [`ConnectionParameters`]. The engine
//! drives a connection from a single thread, but content nested inside a
//! query may run against the same connection while the query is still
//! emitting rows, so every method takes `&self` and implementations keep
//! their own state behind interior mutability.

use std::collections::HashMap;
use std::sync::Arc;

use crate::cancel::{CancellationToken, checkpoint};
use crate::dialect::DialectIdentifier;
use crate::error::Result;
use crate::parameters::ParametersCallback;
use crate::resource::Resource;

/// Receives the rows produced by [`Connection::execute_query`].
pub trait QueryCallback {
    /// Processes one result row.
    ///
    /// `row` answers column names of the current row; it is only valid for
    /// the duration of the call.
    fn process_row(&mut self, row: &dyn ParametersCallback) -> Result<()>;
}

/// A live connection to a data source.
pub trait Connection: Send + Sync {
    /// Returns the dialect used to select dialect-specific content.
    fn dialect(&self) -> DialectIdentifier;

    /// Executes a script, resolving parameters through `parameters`.
    fn execute_script(&self, script: &Resource, parameters: &dyn ParametersCallback) -> Result<()>;

    /// Executes a query and calls `callback` once per produced row, in the
    /// driver's natural iteration order.
    fn execute_query(
        &self,
        query: &Resource,
        parameters: &dyn ParametersCallback,
        callback: &mut dyn QueryCallback,
    ) -> Result<()>;

    /// Commits the current transaction.
    fn commit(&self) -> Result<()>;

    /// Rolls back the current transaction.
    ///
    /// Drivers without transaction support return [`ErrorKind::Unsupported`].
    ///
    /// [`ErrorKind::Unsupported`]: crate::ErrorKind::Unsupported
    fn rollback(&self) -> Result<()>;

    /// Releases the connection. Further calls fail.
    fn close(&self) -> Result<()>;

    /// Returns the number of statements executed so far.
    fn executed_statements(&self) -> u64 {
        0
    }
}

/// Opens connections of one kind.
pub trait Driver: Send + Sync {
    /// Returns the driver name used in connection declarations.
    fn name(&self) -> &str;

    /// Opens a new connection.
    fn connect(&self, parameters: &ConnectionParameters) -> Result<Arc<dyn Connection>>;
}

/// Everything a driver needs to open a connection.
#[derive(Debug, Clone, Default)]
pub struct ConnectionParameters {
    /// Connection identifier, if declared.
    pub id: Option<String>,
    /// Driver-specific URL.
    pub url: Option<String>,
    /// User name.
    pub user: Option<String>,
    /// Password.
    pub password: Option<String>,
    /// Additional driver properties.
    pub properties: HashMap<String, String>,
    /// Cancellation token of the run the connection belongs to.
    pub cancellation: CancellationToken,
}

impl ConnectionParameters {
    /// Creates parameters for the given URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Sets the connection identifier.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets a driver property.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Sets the cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Returns a property value.
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Returns a boolean property, `false` when absent or unparsable.
    pub fn bool_property(&self, key: &str) -> bool {
        self.property(key)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }

    /// Check-point drivers call before every statement.
    #[inline]
    pub fn checkpoint(&self) -> Result<()> {
        checkpoint(&self.cancellation)
    }
}
