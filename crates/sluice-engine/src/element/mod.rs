//! Executable elements and the interceptor chain.
//!
//! An [`ExecutableElement`] is a script or query executor wrapped by an
//! ordered list of [`Interceptor`]s. Each interceptor receives the remaining
//! chain as [`Next`] and decides whether, how often and in which scope the
//! rest of the chain runs.

mod builder;

use std::fmt;

use sluice_core::Result;

pub(crate) use builder::ElementBuilder;

use crate::context::DynamicContext;
use crate::location::Location;
use crate::statistics::ElementKind;

/// Something executable against a [`DynamicContext`].
pub trait Executable: Send + Sync {
    /// Executes once in the given scope.
    fn execute(&self, ctx: &DynamicContext<'_>) -> Result<()>;
}

/// A layer around an element's executor.
pub trait Interceptor: Send + Sync {
    /// Handles one invocation, calling `next` zero or more times.
    fn intercept(&self, ctx: &DynamicContext<'_>, next: Next<'_>) -> Result<()>;
}

/// The remainder of an interceptor chain.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    interceptors: &'a [Box<dyn Interceptor>],
    target: &'a dyn Executable,
}

impl<'a> Next<'a> {
    /// Creates a chain running `interceptors` in order around `target`.
    pub fn new(interceptors: &'a [Box<dyn Interceptor>], target: &'a dyn Executable) -> Self {
        Self {
            interceptors,
            target,
        }
    }

    /// Runs the rest of the chain.
    pub fn run(self, ctx: &DynamicContext<'_>) -> Result<()> {
        match self.interceptors.split_first() {
            Some((first, rest)) => first.intercept(ctx, Next::new(rest, self.target)),
            None => self.target.execute(ctx),
        }
    }
}

/// A prepared script or query.
///
/// Built once when the session is created and invoked any number of times:
/// once for a top-level element, once per row for elements nested in a
/// query.
pub struct ExecutableElement {
    location: Location,
    kind: ElementKind,
    interceptors: Vec<Box<dyn Interceptor>>,
    executor: Box<dyn Executable>,
}

impl ExecutableElement {
    /// Wraps `executor` with `interceptors`, outermost first.
    pub fn new(
        location: Location,
        kind: ElementKind,
        interceptors: Vec<Box<dyn Interceptor>>,
        executor: Box<dyn Executable>,
    ) -> Self {
        Self {
            location,
            kind,
            interceptors,
            executor,
        }
    }

    /// Returns the element location.
    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Returns the element kind.
    pub fn kind(&self) -> ElementKind {
        self.kind
    }
}

impl Executable for ExecutableElement {
    fn execute(&self, ctx: &DynamicContext<'_>) -> Result<()> {
        Next::new(&self.interceptors, self.executor.as_ref())
            .run(ctx)
            .map_err(|error| error.with_location(&self.location))
    }
}

impl fmt::Debug for ExecutableElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutableElement")
            .field("location", &self.location)
            .field("kind", &self.kind)
            .field("interceptors", &self.interceptors.len())
            .finish_non_exhaustive()
    }
}
