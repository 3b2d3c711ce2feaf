//! Per-declaration connection manager.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use sluice_core::{Connection, ConnectionParameters, DialectIdentifier, Driver, Error, ErrorKind, Result};

use crate::TRACING_TARGET_CONNECTION;

/// Owns the primary connection of one declared connection.
///
/// The primary connection is opened on first use and shared by every element
/// bound to this declaration. [`new_connection`](Self::new_connection) opens
/// additional connections the caller owns, used for own transactions.
/// Commit, rollback and close act on the primary connection only.
pub struct ConnectionManager {
    id: Option<String>,
    driver: Arc<dyn Driver>,
    parameters: ConnectionParameters,
    lazy_init: bool,
    primary: Mutex<Option<Arc<dyn Connection>>>,
    closed: AtomicBool,
    statements: AtomicU64,
}

impl ConnectionManager {
    /// Creates a manager. No connection is opened yet.
    pub fn new(driver: Arc<dyn Driver>, parameters: ConnectionParameters, lazy_init: bool) -> Self {
        Self {
            id: parameters.id.clone(),
            driver,
            parameters,
            lazy_init,
            primary: Mutex::new(None),
            closed: AtomicBool::new(false),
            statements: AtomicU64::new(0),
        }
    }

    /// Returns the declared connection id.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Returns true if the connection is opened on first use only.
    pub fn is_lazy(&self) -> bool {
        self.lazy_init
    }

    /// Returns true once the manager has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn primary(&self) -> MutexGuard<'_, Option<Arc<dyn Connection>>> {
        self.primary.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::closed().with_message(format!(
                "connection '{}' is closed",
                self.id().unwrap_or("<default>")
            )));
        }
        Ok(())
    }

    /// Returns the primary connection, opening it on first call.
    pub fn connection(&self) -> Result<Arc<dyn Connection>> {
        self.ensure_open()?;
        let mut primary = self.primary();
        if let Some(connection) = primary.as_ref() {
            return Ok(connection.clone());
        }

        let connection = self.driver.connect(&self.parameters)?;
        tracing::debug!(
            target: TRACING_TARGET_CONNECTION,
            connection = self.id().unwrap_or_default(),
            driver = self.driver.name(),
            dialect = %connection.dialect(),
            "Connection opened"
        );
        *primary = Some(connection.clone());
        Ok(connection)
    }

    /// Opens the primary connection and returns its dialect.
    pub fn open(&self) -> Result<DialectIdentifier> {
        Ok(self.connection()?.dialect())
    }

    /// Opens a new connection owned by the caller.
    ///
    /// The caller is responsible for closing it and for reporting its
    /// statements through [`record_statements`](Self::record_statements).
    pub fn new_connection(&self) -> Result<Arc<dyn Connection>> {
        self.ensure_open()?;
        let connection = self.driver.connect(&self.parameters)?;
        tracing::debug!(
            target: TRACING_TARGET_CONNECTION,
            connection = self.id().unwrap_or_default(),
            driver = self.driver.name(),
            "Additional connection opened"
        );
        Ok(connection)
    }

    /// Adds statements executed by connections this manager does not track.
    pub fn record_statements(&self, count: u64) {
        self.statements.fetch_add(count, Ordering::Relaxed);
    }

    /// Returns the number of statements executed through this manager.
    pub fn executed_statements(&self) -> u64 {
        let primary = self
            .primary()
            .as_ref()
            .map_or(0, |connection| connection.executed_statements());
        self.statements.load(Ordering::Relaxed) + primary
    }

    /// Commits the primary connection, if it was opened.
    pub fn commit(&self) -> Result<()> {
        let Some(connection) = self.primary().clone() else {
            return Ok(());
        };
        connection.commit()?;
        tracing::debug!(
            target: TRACING_TARGET_CONNECTION,
            connection = self.id().unwrap_or_default(),
            "Connection committed"
        );
        Ok(())
    }

    /// Rolls back the primary connection, if it was opened, then closes the
    /// manager.
    ///
    /// Drivers without rollback support are logged and tolerated.
    pub fn rollback(&self) -> Result<()> {
        let rolled_back = match self.primary().clone() {
            Some(connection) => match connection.rollback() {
                Err(error) if error.kind() == ErrorKind::Unsupported => {
                    tracing::warn!(
                        target: TRACING_TARGET_CONNECTION,
                        connection = self.id().unwrap_or_default(),
                        error = %error,
                        "Rollback is not supported, changes may remain"
                    );
                    Ok(())
                }
                other => other,
            },
            None => Ok(()),
        };
        let closed = self.close();
        rolled_back.and(closed)
    }

    /// Closes the primary connection. Further calls are no-ops.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let Some(connection) = self.primary().take() else {
            return Ok(());
        };
        self.statements
            .fetch_add(connection.executed_statements(), Ordering::Relaxed);
        connection.close()?;
        tracing::debug!(
            target: TRACING_TARGET_CONNECTION,
            connection = self.id().unwrap_or_default(),
            "Connection closed"
        );
        Ok(())
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("id", &self.id)
            .field("driver", &self.driver.name())
            .field("lazy_init", &self.lazy_init)
            .field("closed", &self.is_closed())
            .finish()
    }
}
