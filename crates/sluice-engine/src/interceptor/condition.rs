use sluice_core::Result;

use crate::TRACING_TARGET_ELEMENT;
use crate::context::DynamicContext;
use crate::element::{Interceptor, Next};
use crate::expression::Expression;
use crate::location::Location;

/// Skips the element when its `if` expression is false.
pub(crate) struct ConditionInterceptor {
    expression: Expression,
    location: Location,
}

impl ConditionInterceptor {
    pub(crate) fn new(source: &str, location: Location) -> Result<Self> {
        let expression = Expression::parse(source).map_err(|e| e.with_location(&location))?;
        Ok(Self {
            expression,
            location,
        })
    }
}

impl Interceptor for ConditionInterceptor {
    fn intercept(&self, ctx: &DynamicContext<'_>, next: Next<'_>) -> Result<()> {
        if self.expression.evaluate(ctx) {
            return next.run(ctx);
        }
        tracing::trace!(
            target: TRACING_TARGET_ELEMENT,
            location = %self.location,
            condition = %self.expression,
            "Element skipped"
        );
        Ok(())
    }
}
