//! Progress reporting.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// Share of the run spent opening connections.
pub(crate) const WEIGHT_CONNECT: f64 = 0.1;
/// Share of the run spent preparing elements.
pub(crate) const WEIGHT_PREPARE: f64 = 0.05;
/// Share of the run spent executing top-level elements.
pub(crate) const WEIGHT_EXECUTE: f64 = 0.8;

/// Receives progress notifications of a run.
pub trait ProgressIndicator: Send + Sync {
    /// Reports overall progress in `0.0..=1.0` and what just happened.
    fn show_progress(&self, fraction: f64, message: &str);
}

/// Emits progress as `info` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingProgress;

impl ProgressIndicator for TracingProgress {
    fn show_progress(&self, fraction: f64, message: &str) {
        tracing::info!(
            target: crate::TRACING_TARGET,
            percent = (fraction * 100.0).round(),
            "{message}"
        );
    }
}

/// Discards progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentProgress;

impl ProgressIndicator for SilentProgress {
    fn show_progress(&self, _fraction: f64, _message: &str) {}
}

/// Accumulates weighted steps and forwards the total to an indicator.
pub(crate) struct ProgressTracker {
    indicator: Arc<dyn ProgressIndicator>,
    completed: Mutex<f64>,
}

impl ProgressTracker {
    pub(crate) fn new(indicator: Arc<dyn ProgressIndicator>) -> Self {
        Self {
            indicator,
            completed: Mutex::new(0.0),
        }
    }

    /// Adds `weight` to the completed share and reports it.
    pub(crate) fn advance(&self, weight: f64, message: &str) {
        let fraction = {
            let mut completed = self.completed.lock().unwrap_or_else(PoisonError::into_inner);
            *completed = (*completed + weight).min(1.0);
            *completed
        };
        self.indicator.show_progress(fraction, message);
    }

    /// Reports completion.
    pub(crate) fn complete(&self, message: &str) {
        *self.completed.lock().unwrap_or_else(PoisonError::into_inner) = 1.0;
        self.indicator.show_progress(1.0, message);
    }
}

impl fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("completed", &self.completed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Records every notification.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingProgress(pub(crate) Mutex<Vec<(f64, String)>>);

    impl ProgressIndicator for RecordingProgress {
        fn show_progress(&self, fraction: f64, message: &str) {
            self.0.lock().unwrap().push((fraction, message.to_owned()));
        }
    }

    #[test]
    fn steps_accumulate_and_saturate() {
        let recording = Arc::new(RecordingProgress::default());
        let tracker = ProgressTracker::new(recording.clone());
        tracker.advance(0.25, "first");
        tracker.advance(0.5, "second");
        tracker.advance(0.5, "third");
        tracker.complete("done");

        let fractions: Vec<f64> = recording.0.lock().unwrap().iter().map(|(f, _)| *f).collect();
        assert_eq!(fractions, vec![0.25, 0.75, 1.0, 1.0]);
    }
}
