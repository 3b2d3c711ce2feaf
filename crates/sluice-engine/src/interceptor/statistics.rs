use std::sync::Arc;
use std::time::Instant;

use sluice_core::Result;

use crate::context::DynamicContext;
use crate::element::{Interceptor, Next};
use crate::statistics::ElementCounters;

/// Records one success or failure and the elapsed time per invocation.
pub(crate) struct StatisticsInterceptor {
    counters: Arc<ElementCounters>,
}

impl StatisticsInterceptor {
    pub(crate) fn new(counters: Arc<ElementCounters>) -> Self {
        Self { counters }
    }
}

impl Interceptor for StatisticsInterceptor {
    fn intercept(&self, ctx: &DynamicContext<'_>, next: Next<'_>) -> Result<()> {
        let started = Instant::now();
        let result = next.run(ctx);
        self.counters.record(result.is_ok(), started.elapsed());
        result
    }
}
