//! Per-invocation parameter and connection scope.

use std::cell::OnceCell;
use std::fmt;
use std::sync::Arc;

use sluice_core::{Connection, Error, ParametersCallback, Result, Value};

use super::EtlContext;
use crate::connection::ConnectionManager;

/// A connection that replaces a manager's primary connection for the
/// duration of an own transaction.
pub struct TransactionBinding {
    manager: Arc<ConnectionManager>,
    connection: Arc<dyn Connection>,
}

impl TransactionBinding {
    /// Binds `connection` in place of the primary connection of `manager`.
    pub fn new(manager: Arc<ConnectionManager>, connection: Arc<dyn Connection>) -> Self {
        Self {
            manager,
            connection,
        }
    }

    fn is_for(&self, manager: &ConnectionManager) -> bool {
        std::ptr::eq(Arc::as_ptr(&self.manager), manager)
    }
}

impl fmt::Debug for TransactionBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionBinding")
            .field("manager", &self.manager.id())
            .finish_non_exhaustive()
    }
}

/// Scope an element executes against.
///
/// Parameter lookups are answered by the scope's own parameters first, then
/// by the chain of parent scopes down to the global parameters of the run. The connection is resolved on the first
/// [`connection`](Self::connection) call and cached for the life of the
/// scope. Child scopes never modify their parent and start with an empty
/// connection cache.
pub struct DynamicContext<'a> {
    etl: &'a EtlContext,
    parameters: &'a dyn ParametersCallback,
    parent: Option<&'a dyn ParametersCallback>,
    binding: Option<&'a ConnectionManager>,
    transaction: Option<&'a TransactionBinding>,
    connection: OnceCell<Arc<dyn Connection>>,
}

impl<'a> DynamicContext<'a> {
    /// Creates the root scope of a run.
    pub fn new(etl: &'a EtlContext) -> Self {
        Self {
            etl,
            parameters: etl,
            parent: None,
            binding: None,
            transaction: None,
            connection: OnceCell::new(),
        }
    }

    /// Returns the run context.
    pub fn etl(&self) -> &'a EtlContext {
        self.etl
    }

    /// Returns a child scope answering lookups from `parameters`, falling
    /// back to this scope for names `parameters` does not define.
    pub fn with_parameters<'b>(
        &'b self,
        parameters: &'b dyn ParametersCallback,
    ) -> DynamicContext<'b> {
        DynamicContext {
            etl: self.etl,
            parameters,
            parent: Some(self),
            binding: self.binding,
            transaction: self.transaction,
            connection: OnceCell::new(),
        }
    }

    /// Returns a child scope bound to the connection of `manager`.
    pub fn bind<'b>(&'b self, manager: &'b ConnectionManager) -> DynamicContext<'b> {
        DynamicContext {
            etl: self.etl,
            parameters: self,
            parent: None,
            binding: Some(manager),
            transaction: self.transaction,
            connection: OnceCell::new(),
        }
    }

    /// Returns a child scope where `transaction` overrides its manager.
    pub fn with_transaction<'b>(
        &'b self,
        transaction: &'b TransactionBinding,
    ) -> DynamicContext<'b> {
        DynamicContext {
            etl: self.etl,
            parameters: self,
            parent: None,
            binding: self.binding,
            transaction: Some(transaction),
            connection: OnceCell::new(),
        }
    }

    /// Returns the bound connection manager.
    pub fn connection_manager(&self) -> Option<&'a ConnectionManager> {
        self.binding
    }

    /// Returns the connection of this scope, resolving it on first call.
    pub fn connection(&self) -> Result<Arc<dyn Connection>> {
        if let Some(connection) = self.connection.get() {
            return Ok(connection.clone());
        }

        let manager = self
            .binding
            .ok_or_else(|| Error::internal().with_message("no connection is bound to this scope"))?;
        let connection = match self.transaction {
            Some(transaction) if transaction.is_for(manager) => transaction.connection.clone(),
            _ => manager.connection()?,
        };
        Ok(self.connection.get_or_init(|| connection).clone())
    }

    /// Fails with a cancellation error if the run was cancelled.
    #[inline]
    pub fn checkpoint(&self) -> Result<()> {
        self.etl.checkpoint()
    }
}

impl ParametersCallback for DynamicContext<'_> {
    fn parameter(&self, name: &str) -> Option<Value> {
        self.parameters
            .parameter(name)
            .or_else(|| self.parent?.parameter(name))
    }
}

impl fmt::Debug for DynamicContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicContext")
            .field("run_id", &self.etl.run_id())
            .field("binding", &self.binding.map(ConnectionManager::id))
            .field("transaction", &self.transaction.is_some())
            .field("resolved", &self.connection.get().is_some())
            .finish()
    }
}
