//! Execution contexts.
//!
//! [`EtlContext`] lives for a whole run and carries what every element may
//! need: the global parameters, the cancellation token, progress and
//! statistics. [`DynamicContext`] is the per-invocation scope elements
//! execute against.

mod dynamic;

use std::sync::Arc;

use sluice_core::{CancellationToken, Parameters, ParametersCallback, Result, Value, checkpoint};
use uuid::Uuid;

pub use dynamic::{DynamicContext, TransactionBinding};

use crate::progress::{ProgressIndicator, ProgressTracker, SilentProgress};
use crate::statistics::StatisticsCollector;

/// Run-wide state shared by every element of a run.
#[derive(Debug)]
pub struct EtlContext {
    run_id: Uuid,
    parameters: Parameters,
    cancellation: CancellationToken,
    progress: ProgressTracker,
    statistics: StatisticsCollector,
    collect_statistics: bool,
}

impl EtlContext {
    /// Creates a context over the given global parameters.
    pub fn new(parameters: Parameters) -> Self {
        Self {
            run_id: Uuid::now_v7(),
            parameters,
            cancellation: CancellationToken::new(),
            progress: ProgressTracker::new(Arc::new(SilentProgress)),
            statistics: StatisticsCollector::new(),
            collect_statistics: true,
        }
    }

    /// Sets the cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Sets the progress indicator.
    #[must_use]
    pub fn with_progress(mut self, indicator: Arc<dyn ProgressIndicator>) -> Self {
        self.progress = ProgressTracker::new(indicator);
        self
    }

    /// Sets the statistics collector and whether elements record into it.
    #[must_use]
    pub fn with_statistics(mut self, statistics: StatisticsCollector, collect: bool) -> Self {
        self.statistics = statistics;
        self.collect_statistics = collect;
        self
    }

    /// Returns the run identifier.
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Returns the cancellation token of the run.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Fails with a cancellation error if the run was cancelled.
    #[inline]
    pub fn checkpoint(&self) -> Result<()> {
        checkpoint(&self.cancellation)
    }

    /// Returns the statistics collector.
    pub fn statistics(&self) -> &StatisticsCollector {
        &self.statistics
    }

    /// Returns true if elements record statistics.
    pub fn collect_statistics(&self) -> bool {
        self.collect_statistics
    }

    pub(crate) fn progress(&self) -> &ProgressTracker {
        &self.progress
    }
}

impl ParametersCallback for EtlContext {
    fn parameter(&self, name: &str) -> Option<Value> {
        self.parameters.parameter(name)
    }
}
