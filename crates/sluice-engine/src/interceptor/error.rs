use std::path::Path;
use std::sync::Arc;

use regex::Regex;
use sluice_core::{Error, Result};

use crate::TRACING_TARGET_ELEMENT;
use crate::config::{ErrorPolicy, OnErrorDecl};
use crate::connection::ConnectionManager;
use crate::context::DynamicContext;
use crate::element::{Interceptor, Next};
use crate::executor::ContentResolver;
use crate::location::Location;

/// A prepared `on_error` handler.
#[derive(Debug)]
pub(crate) struct ErrorHandler {
    message: Option<Regex>,
    codes: Vec<String>,
    content: Option<ContentResolver>,
    retry: bool,
}

impl ErrorHandler {
    fn new(decl: &OnErrorDecl, base_dir: Option<&Path>, location: &Location) -> Result<Self> {
        let message = decl
            .message
            .as_deref()
            .map(|source| {
                Regex::new(source).map_err(|e| {
                    Error::configuration()
                        .with_message(format!("invalid error pattern '{source}': {e}"))
                        .with_source(e)
                        .with_location(location)
                })
            })
            .transpose()?;
        let content = decl
            .content
            .as_ref()
            .map(|content| ContentResolver::new(content, base_dir, location))
            .transpose()?;

        Ok(Self {
            message,
            codes: decl.codes.clone(),
            content,
            retry: decl.retry,
        })
    }

    /// Returns true if the message pattern matches the error or one of its
    /// sources, and the error reports one of the codes.
    fn matches(&self, error: &Error) -> bool {
        let message = self.message.as_ref().is_none_or(|re| {
            std::iter::successors(Some(error as &dyn std::error::Error), |e| e.source())
                .any(|e| re.is_match(&e.to_string()))
        });
        let code = self.codes.is_empty() || error.codes.iter().any(|c| self.codes.contains(c));
        message && code
    }
}

/// Error handlers of an element and its policy for unhandled errors.
#[derive(Debug, Default)]
pub(crate) struct ErrorHandling {
    handlers: Vec<ErrorHandler>,
    policy: ErrorPolicy,
}

impl ErrorHandling {
    pub(crate) fn new(
        decls: &[OnErrorDecl],
        policy: ErrorPolicy,
        base_dir: Option<&Path>,
        location: &Location,
    ) -> Result<Self> {
        let handlers = decls
            .iter()
            .map(|decl| ErrorHandler::new(decl, base_dir, location))
            .collect::<Result<_>>()?;
        Ok(Self { handlers, policy })
    }

    /// Returns true if every error propagates unchanged.
    pub(crate) fn is_trivial(&self) -> bool {
        self.handlers.is_empty() && self.policy == ErrorPolicy::Abort
    }

    fn find(&self, error: &Error) -> Option<&ErrorHandler> {
        self.handlers.iter().find(|handler| handler.matches(error))
    }
}

/// Applies an element's error handling. The only layer that swallows errors.
///
/// A matching handler runs its fallback content on the element's connection
/// and, if requested, runs the element once more; the outcome of the retry
/// is final. Unmatched errors follow the policy. Cancellation always
/// propagates.
pub(crate) struct ErrorPolicyInterceptor {
    handling: ErrorHandling,
    manager: Arc<ConnectionManager>,
    location: Location,
}

impl ErrorPolicyInterceptor {
    pub(crate) fn new(handling: ErrorHandling, manager: Arc<ConnectionManager>, location: Location) -> Self {
        Self {
            handling,
            manager,
            location,
        }
    }

    fn fallback(&self, ctx: &DynamicContext<'_>, content: &ContentResolver) -> Result<()> {
        let scope = ctx.bind(&self.manager);
        let connection = scope.connection()?;
        let script = content.resolve(&connection.dialect());
        connection.execute_script(&script, &scope)
    }
}

impl Interceptor for ErrorPolicyInterceptor {
    fn intercept(&self, ctx: &DynamicContext<'_>, next: Next<'_>) -> Result<()> {
        let error = match next.run(ctx) {
            Ok(()) => return Ok(()),
            Err(error) if error.is_cancelled() => return Err(error),
            Err(error) => error,
        };

        if let Some(handler) = self.handling.find(&error) {
            tracing::warn!(
                target: TRACING_TARGET_ELEMENT,
                location = %self.location,
                error = %error,
                retry = handler.retry,
                "Error handled"
            );
            if let Some(content) = &handler.content {
                self.fallback(ctx, content)
                    .map_err(|e| e.with_location(&self.location))?;
            }
            return if handler.retry { next.run(ctx) } else { Ok(()) };
        }

        match self.handling.policy {
            ErrorPolicy::Abort => Err(error.with_location(&self.location)),
            ErrorPolicy::Continue => {
                tracing::warn!(
                    target: TRACING_TARGET_ELEMENT,
                    location = %self.location,
                    error = %error,
                    "Element failed, continuing"
                );
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use sluice_core::{ConnectionParameters, Parameters};
    use sluice_test::MemoryDriver;

    use super::*;
    use crate::context::EtlContext;
    use crate::element::Executable;

    /// Fails every call with the error `outcome` builds.
    struct Failing {
        calls: AtomicUsize,
        outcome: fn() -> Error,
    }

    impl Executable for Failing {
        fn execute(&self, _ctx: &DynamicContext<'_>) -> Result<()> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            Err((self.outcome)())
        }
    }

    fn intercept(decls: &[OnErrorDecl], policy: ErrorPolicy, outcome: fn() -> Error) -> (Result<()>, usize) {
        let location = Location::root().child("script", 1);
        let handling = ErrorHandling::new(decls, policy, None, &location).unwrap();
        let manager = Arc::new(ConnectionManager::new(
            Arc::new(MemoryDriver::new()),
            ConnectionParameters::new("db"),
            true,
        ));
        let interceptor = ErrorPolicyInterceptor::new(handling, manager, location);
        let target = Failing {
            calls: AtomicUsize::new(0),
            outcome,
        };
        let etl = EtlContext::new(Parameters::new());
        let result = interceptor.intercept(&DynamicContext::new(&etl), Next::new(&[], &target));
        (result, target.calls.load(Ordering::Relaxed))
    }

    fn handler(message: Option<&str>, codes: &[&str]) -> ErrorHandler {
        let decl = OnErrorDecl {
            message: message.map(str::to_owned),
            codes: codes.iter().map(|c| (*c).to_owned()).collect(),
            ..OnErrorDecl::default()
        };
        ErrorHandler::new(&decl, None, &Location::root()).unwrap()
    }

    #[test]
    fn handlers_match_message_and_codes() {
        let error = Error::provider().with_message("duplicate key").with_code("23505");

        assert!(handler(None, &[]).matches(&error));
        assert!(handler(Some("duplicate"), &[]).matches(&error));
        assert!(handler(None, &["42P01", "23505"]).matches(&error));
        assert!(handler(Some("key"), &["23505"]).matches(&error));
        assert!(!handler(Some("timeout"), &[]).matches(&error));
        assert!(!handler(Some("duplicate"), &["42P01"]).matches(&error));
    }

    #[test]
    fn messages_of_sources_are_searched() {
        let io = std::io::Error::other("disk quota exceeded");
        let error = Error::provider().with_message("write failed").with_source(io);
        assert!(handler(Some("quota"), &[]).matches(&error));
    }

    #[test]
    fn invalid_patterns_are_configuration_errors() {
        let decl = OnErrorDecl {
            message: Some("(".into()),
            ..OnErrorDecl::default()
        };
        let error = ErrorHandler::new(&decl, None, &Location::root()).unwrap_err();
        assert_eq!(error.kind(), sluice_core::ErrorKind::Configuration);
    }

    #[test]
    fn continue_policy_swallows_failures() {
        let (result, calls) = intercept(&[], ErrorPolicy::Continue, || {
            Error::provider().with_message("boom")
        });
        assert!(result.is_ok());
        assert_eq!(calls, 1);
    }

    #[test]
    fn continue_policy_propagates_cancellation() {
        let (result, calls) = intercept(&[], ErrorPolicy::Continue, Error::cancelled);
        assert!(result.unwrap_err().is_cancelled());
        assert_eq!(calls, 1);
    }

    #[test]
    fn handlers_never_see_cancellation() {
        let decls = [OnErrorDecl {
            retry: true,
            ..OnErrorDecl::default()
        }];
        let (result, calls) = intercept(&decls, ErrorPolicy::Abort, Error::cancelled);
        assert!(result.unwrap_err().is_cancelled());
        assert_eq!(calls, 1);
    }

    #[test]
    fn retry_outcome_is_final() {
        let decls = [OnErrorDecl {
            retry: true,
            ..OnErrorDecl::default()
        }];
        let (result, calls) = intercept(&decls, ErrorPolicy::Continue, || {
            Error::provider().with_message("boom")
        });
        assert_eq!(result.unwrap_err().message(), "boom");
        assert_eq!(calls, 2);
    }
}
