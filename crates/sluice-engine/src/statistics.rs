//! Execution statistics.
//!
//! Elements record into atomic counters registered with a shared
//! [`StatisticsCollector`]. A monitoring thread may take a
//! [`snapshot`](StatisticsCollector::snapshot) at any time while the run
//! thread keeps counting; counters only ever increase during a run.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use jiff::{SignedDuration, Timestamp};
use serde::Serialize;
use strum::{AsRefStr, IntoStaticStr};
use uuid::Uuid;

use crate::location::Location;

/// Kind of an executable element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, IntoStaticStr, Serialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ElementKind {
    /// A script.
    Script,
    /// A query.
    Query,
}

/// Counters of one element.
#[derive(Debug, Default)]
pub(crate) struct ElementCounters {
    successful: AtomicU64,
    failed: AtomicU64,
    working_nanos: AtomicU64,
}

impl ElementCounters {
    /// Records one invocation.
    pub(crate) fn record(&self, success: bool, elapsed: Duration) {
        let counter = if success {
            &self.successful
        } else {
            &self.failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.working_nanos.fetch_add(nanos, Ordering::Relaxed);
    }
}

#[derive(Debug)]
struct ElementEntry {
    location: Location,
    kind: ElementKind,
    counters: Arc<ElementCounters>,
}

#[derive(Debug, Default)]
struct RunState {
    run_id: Option<Uuid>,
    started: Option<Timestamp>,
    finished: Option<Timestamp>,
    elements: Vec<ElementEntry>,
}

#[derive(Debug, Default)]
struct CollectorInner {
    state: Mutex<RunState>,
    statements: AtomicU64,
}

/// Shared, thread-safe collector of run statistics.
///
/// Cloning is cheap and every clone observes the same counters.
#[derive(Debug, Clone, Default)]
pub struct StatisticsCollector {
    inner: Arc<CollectorInner>,
}

impl StatisticsCollector {
    /// Creates an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, RunState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Clears previous results and marks the start of a run.
    pub(crate) fn begin(&self, run_id: Uuid) {
        let mut state = self.state();
        *state = RunState {
            run_id: Some(run_id),
            started: Some(Timestamp::now()),
            ..RunState::default()
        };
        self.inner.statements.store(0, Ordering::Relaxed);
    }

    /// Registers an element and returns its counters.
    pub(crate) fn register(&self, location: &Location, kind: ElementKind) -> Arc<ElementCounters> {
        let counters = Arc::new(ElementCounters::default());
        self.state().elements.push(ElementEntry {
            location: location.clone(),
            kind,
            counters: counters.clone(),
        });
        counters
    }

    /// Sets the aggregate executed-statement count.
    pub(crate) fn set_executed_statements(&self, count: u64) {
        self.inner.statements.store(count, Ordering::Relaxed);
    }

    /// Marks the end of the run and returns the final statistics.
    pub(crate) fn finish(&self) -> ExecutionStatistics {
        self.state().finished = Some(Timestamp::now());
        self.snapshot()
    }

    /// Returns the current statistics.
    pub fn snapshot(&self) -> ExecutionStatistics {
        let state = self.state();
        ExecutionStatistics {
            run_id: state.run_id,
            started: state.started,
            finished: state.finished,
            executed_statements: self.inner.statements.load(Ordering::Relaxed),
            elements: state
                .elements
                .iter()
                .map(|entry| ElementStatistics {
                    location: entry.location.to_string(),
                    kind: entry.kind,
                    successful: entry.counters.successful.load(Ordering::Relaxed),
                    failed: entry.counters.failed.load(Ordering::Relaxed),
                    working_time: Duration::from_nanos(
                        entry.counters.working_nanos.load(Ordering::Relaxed),
                    ),
                })
                .collect(),
        }
    }
}

/// Statistics of one element.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElementStatistics {
    /// Element location.
    pub location: String,
    /// Element kind.
    pub kind: ElementKind,
    /// Successful invocations.
    pub successful: u64,
    /// Failed invocations.
    pub failed: u64,
    /// Time spent inside the element, nested elements included.
    pub working_time: Duration,
}

impl ElementStatistics {
    /// Returns the number of invocations.
    pub fn invocations(&self) -> u64 {
        self.successful + self.failed
    }
}

/// Statistics of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionStatistics {
    /// Run identifier.
    pub run_id: Option<Uuid>,
    /// When the run started.
    pub started: Option<Timestamp>,
    /// When the run finished.
    pub finished: Option<Timestamp>,
    /// Statements executed over all connections.
    pub executed_statements: u64,
    /// Per-element statistics in document order.
    pub elements: Vec<ElementStatistics>,
}

impl ExecutionStatistics {
    /// Returns the statistics of the element at `location`.
    pub fn element(&self, location: &str) -> Option<&ElementStatistics> {
        self.elements.iter().find(|e| e.location == location)
    }

    /// Returns the wall-clock duration of a finished run.
    pub fn total_time(&self) -> Option<SignedDuration> {
        Some(self.finished?.duration_since(self.started?))
    }
}

impl fmt::Display for ExecutionStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Executed {} elements, {} statements",
            self.elements.len(),
            self.executed_statements
        )?;
        if let Some(total) = self.total_time() {
            write!(f, " in {total:#}")?;
        }
        for element in &self.elements {
            write!(
                f,
                "\n  {} ({}): {} ok, {} failed, {:?}",
                element.location,
                AsRef::<str>::as_ref(&element.kind),
                element.successful,
                element.failed,
                element.working_time
            )?;
        }
        Ok(())
    }
}
