//! Prepares executable elements from their declarations.

use std::path::Path;
use std::sync::Arc;

use sluice_core::Result;

use super::{Executable, ExecutableElement, Interceptor};
use crate::TRACING_TARGET_SESSION;
use crate::config::ElementDecl;
use crate::connection::ConnectionManager;
use crate::context::EtlContext;
use crate::executor::{ContentResolver, QueryExecutor, ScriptExecutor};
use crate::interceptor::{
    ConditionInterceptor, ConnectionInterceptor, ErrorHandling, ErrorPolicyInterceptor,
    StatisticsInterceptor, TransactionInterceptor,
};
use crate::location::{Location, SiblingIndex};
use crate::session::select_manager;
use crate::statistics::ElementKind;

/// Builds element trees with their interceptor chains.
pub(crate) struct ElementBuilder<'a> {
    managers: &'a [Arc<ConnectionManager>],
    etl: &'a EtlContext,
    base_dir: Option<&'a Path>,
}

impl<'a> ElementBuilder<'a> {
    pub(crate) fn new(
        managers: &'a [Arc<ConnectionManager>],
        etl: &'a EtlContext,
        base_dir: Option<&'a Path>,
    ) -> Self {
        Self {
            managers,
            etl,
            base_dir,
        }
    }

    /// Builds `decls` as children of `parent`, in declaration order.
    ///
    /// Elements without a connection id inherit `connection_id` from their
    /// parent.
    pub(crate) fn build_all(
        &self,
        decls: &[ElementDecl],
        parent: &Location,
        connection_id: Option<&str>,
    ) -> Result<Vec<ExecutableElement>> {
        let mut siblings = SiblingIndex::default();
        decls
            .iter()
            .map(|decl| {
                let location = parent.child(decl.tag(), siblings.next(decl.tag()));
                self.build(decl, location, connection_id)
            })
            .collect()
    }

    fn build(
        &self,
        decl: &ElementDecl,
        location: Location,
        parent_connection: Option<&str>,
    ) -> Result<ExecutableElement> {
        let connection_id = decl.connection_id().or(parent_connection);
        let manager = select_manager(self.managers, connection_id)
            .map_err(|e| e.with_location(&location))?
            .clone();
        let content = ContentResolver::new(decl.content(), self.base_dir, &location)?;

        let kind = match decl {
            ElementDecl::Script(_) => ElementKind::Script,
            ElementDecl::Query(_) => ElementKind::Query,
        };
        // Registered before the children so statistics follow document order.
        let counters = self
            .etl
            .collect_statistics()
            .then(|| self.etl.statistics().register(&location, kind));

        let executor: Box<dyn Executable> = match decl {
            ElementDecl::Script(_) => Box::new(ScriptExecutor::new(content)),
            ElementDecl::Query(query) => {
                let children = self.build_all(&query.children, &location, connection_id)?;
                Box::new(QueryExecutor::new(content, children))
            }
        };

        let mut interceptors: Vec<Box<dyn Interceptor>> = Vec::new();
        if let Some(condition) = decl.condition() {
            interceptors.push(Box::new(ConditionInterceptor::new(condition, location.clone())?));
        }
        if matches!(decl, ElementDecl::Script(script) if script.new_tx) {
            interceptors.push(Box::new(TransactionInterceptor::new(
                manager.clone(),
                location.clone(),
            )));
        }
        let handling = ErrorHandling::new(
            decl.on_error(),
            decl.error_policy(),
            self.base_dir,
            &location,
        )?;
        if !handling.is_trivial() {
            interceptors.push(Box::new(ErrorPolicyInterceptor::new(
                handling,
                manager.clone(),
                location.clone(),
            )));
        }
        interceptors.push(Box::new(ConnectionInterceptor::new(manager.clone())));
        if let Some(counters) = counters {
            interceptors.push(Box::new(StatisticsInterceptor::new(counters)));
        }

        tracing::debug!(
            target: TRACING_TARGET_SESSION,
            location = %location,
            kind = kind.as_ref(),
            connection = manager.id().unwrap_or_default(),
            interceptors = interceptors.len(),
            "Element prepared"
        );

        Ok(ExecutableElement::new(location, kind, interceptors, executor))
    }
}
