use std::sync::Arc;

use sluice_core::Result;

use crate::connection::ConnectionManager;
use crate::context::DynamicContext;
use crate::element::{Interceptor, Next};

/// Binds the element's connection manager for the rest of the chain.
///
/// The connection itself is resolved lazily, on the first
/// [`DynamicContext::connection`] call of the invocation.
pub(crate) struct ConnectionInterceptor {
    manager: Arc<ConnectionManager>,
}

impl ConnectionInterceptor {
    pub(crate) fn new(manager: Arc<ConnectionManager>) -> Self {
        Self { manager }
    }
}

impl Interceptor for ConnectionInterceptor {
    fn intercept(&self, ctx: &DynamicContext<'_>, next: Next<'_>) -> Result<()> {
        next.run(&ctx.bind(&self.manager))
    }
}
