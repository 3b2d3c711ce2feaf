use std::sync::Arc;

use sluice_core::Result;

use crate::TRACING_TARGET_ELEMENT;
use crate::connection::ConnectionManager;
use crate::context::{DynamicContext, TransactionBinding};
use crate::element::{Interceptor, Next};
use crate::location::Location;

/// Runs the element on a private connection committed on its own.
///
/// Failures roll the private connection back and are logged, not
/// propagated, except cancellation. A connection that cannot be opened is
/// treated the same way. The connection is always closed and its statements
/// are added to the manager.
pub(crate) struct TransactionInterceptor {
    manager: Arc<ConnectionManager>,
    location: Location,
}

impl TransactionInterceptor {
    pub(crate) fn new(manager: Arc<ConnectionManager>, location: Location) -> Self {
        Self { manager, location }
    }
}

impl Interceptor for TransactionInterceptor {
    fn intercept(&self, ctx: &DynamicContext<'_>, next: Next<'_>) -> Result<()> {
        let connection = match self.manager.new_connection() {
            Ok(connection) => connection,
            Err(error) if error.is_cancelled() => return Err(error),
            Err(error) => {
                tracing::warn!(
                    target: TRACING_TARGET_ELEMENT,
                    location = %self.location,
                    error = %error,
                    "Own transaction connection could not be opened"
                );
                return Ok(());
            }
        };
        let binding = TransactionBinding::new(self.manager.clone(), connection.clone());

        let result = next
            .run(&ctx.with_transaction(&binding))
            .and_then(|()| connection.commit());

        let outcome = match result {
            Ok(()) => Ok(()),
            Err(error) => {
                if let Err(rollback) = connection.rollback() {
                    tracing::warn!(
                        target: TRACING_TARGET_ELEMENT,
                        location = %self.location,
                        error = %rollback,
                        "Own transaction rollback failed"
                    );
                }
                if error.is_cancelled() {
                    Err(error)
                } else {
                    tracing::warn!(
                        target: TRACING_TARGET_ELEMENT,
                        location = %self.location,
                        error = %error,
                        "Own transaction failed and was rolled back"
                    );
                    Ok(())
                }
            }
        };

        self.manager
            .record_statements(connection.executed_statements());
        if let Err(error) = connection.close() {
            tracing::warn!(
                target: TRACING_TARGET_ELEMENT,
                location = %self.location,
                error = %error,
                "Own transaction connection close failed"
            );
        }
        outcome
    }
}
