//! Driving shell of an ETL run.

use std::fmt;
use std::sync::Arc;

use sluice_core::{CancellationToken, Error, Parameters};

use crate::TRACING_TARGET;
use crate::config::{EtlConfig, ExecutorConfig};
use crate::connection::DriverRegistry;
use crate::context::{DynamicContext, EtlContext};
use crate::error::{EtlError, EtlResult};
use crate::progress::{ProgressIndicator, TracingProgress};
use crate::session::Session;
use crate::statistics::{ExecutionStatistics, StatisticsCollector};

/// Executes an [`EtlConfig`] as one transactional run.
///
/// On success every connection is committed, then closed. On failure or
/// cancellation every connection is rolled back and closed, and the original
/// cause is returned.
///
/// The run executes on the calling thread. Other threads may cancel it
/// through [`cancellation_token`](Self::cancellation_token) and watch it
/// through [`statistics`](Self::statistics).
pub struct EtlExecutor {
    config: EtlConfig,
    settings: ExecutorConfig,
    drivers: DriverRegistry,
    progress: Arc<dyn ProgressIndicator>,
    cancellation: CancellationToken,
    statistics: StatisticsCollector,
}

impl EtlExecutor {
    /// Creates an executor with default settings.
    pub fn new(config: EtlConfig, drivers: DriverRegistry) -> Self {
        Self {
            config,
            settings: ExecutorConfig::default(),
            drivers,
            progress: Arc::new(TracingProgress),
            cancellation: CancellationToken::new(),
            statistics: StatisticsCollector::new(),
        }
    }

    /// Sets the executor settings.
    #[must_use]
    pub fn with_settings(mut self, settings: ExecutorConfig) -> Self {
        self.settings = settings;
        self
    }

    /// Sets the progress indicator.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressIndicator>) -> Self {
        self.progress = progress;
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &EtlConfig {
        &self.config
    }

    /// Returns a token that cancels the run when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Returns the collector the run records into.
    pub fn statistics(&self) -> StatisticsCollector {
        self.statistics.clone()
    }

    fn parameters(&self) -> Parameters {
        let mut parameters: Parameters = self.config.property_values().collect();
        for (name, value) in self.settings.parameter_values() {
            parameters.insert(name, value);
        }
        parameters
    }

    /// Executes the run and returns its statistics.
    pub fn execute(&self) -> EtlResult<ExecutionStatistics> {
        let etl = EtlContext::new(self.parameters())
            .with_cancellation(self.cancellation.clone())
            .with_progress(self.progress.clone())
            .with_statistics(self.statistics.clone(), self.settings.collect_statistics);
        self.statistics.begin(etl.run_id());

        tracing::info!(
            target: TRACING_TARGET,
            run_id = %etl.run_id(),
            connections = self.config.connections.len(),
            elements = self.config.elements.len(),
            "ETL run started"
        );

        let mut session = match Session::new(&self.config, &etl, &self.drivers) {
            Ok(session) => session,
            Err(error) => return Err(self.fail(&etl, error, 0)),
        };

        let outcome = session
            .execute(&DynamicContext::new(&etl))
            .and_then(|()| etl.checkpoint())
            .and_then(|()| session.commit());

        match outcome {
            Ok(()) => {
                session.close();
                self.statistics
                    .set_executed_statements(session.executed_statements());
                etl.progress().complete("ETL run completed");
                let statistics = self.statistics.finish();
                tracing::info!(
                    target: TRACING_TARGET,
                    run_id = %etl.run_id(),
                    statements = statistics.executed_statements,
                    "ETL run completed"
                );
                Ok(statistics)
            }
            Err(error) => {
                if let Err(rollback) = session.rollback() {
                    tracing::warn!(
                        target: TRACING_TARGET,
                        run_id = %etl.run_id(),
                        error = %rollback,
                        "Rollback after failure did not complete"
                    );
                }
                session.close();
                Err(self.fail(&etl, error, session.executed_statements()))
            }
        }
    }

    fn fail(&self, etl: &EtlContext, error: Error, statements: u64) -> EtlError {
        self.statistics.set_executed_statements(statements);
        self.statistics.finish();

        // A driver may report cancellation as an ordinary failure.
        let error = if self.cancellation.is_cancelled() {
            EtlError::Cancelled
        } else {
            EtlError::from(error)
        };
        match &error {
            EtlError::Cancelled => tracing::warn!(
                target: TRACING_TARGET,
                run_id = %etl.run_id(),
                "ETL run cancelled"
            ),
            other => tracing::error!(
                target: TRACING_TARGET,
                run_id = %etl.run_id(),
                location = other.location().unwrap_or_default(),
                error = %other,
                "ETL run failed"
            ),
        }
        error
    }
}

impl fmt::Debug for EtlExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EtlExecutor")
            .field("settings", &self.settings)
            .field("drivers", &self.drivers)
            .field("cancelled", &self.cancellation.is_cancelled())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use serde_json::json;
    use sluice_core::Value;
    use sluice_test::{JournalEntry, MemoryDriver};

    use super::*;
    use crate::progress::tests::RecordingProgress;

    const SOURCE: &str = "CREATE TABLE src (id INT, label TEXT); \
        INSERT INTO src VALUES (1, 'One'); \
        INSERT INTO src VALUES (3, 'Three')";

    fn prepare(value: serde_json::Value) -> (Arc<MemoryDriver>, EtlExecutor) {
        let driver = Arc::new(MemoryDriver::new());
        let drivers = DriverRegistry::new().with_driver(driver.clone());
        let config = EtlConfig::from_json(&value.to_string()).unwrap();
        (driver, EtlExecutor::new(config, drivers))
    }

    fn single(elements: serde_json::Value) -> (Arc<MemoryDriver>, EtlExecutor) {
        prepare(json!({
            "connections": [{ "id": "db", "driver": "memory", "url": "db" }],
            "elements": elements
        }))
    }

    fn row(values: impl IntoIterator<Item = Value>) -> Vec<Value> {
        values.into_iter().collect()
    }

    #[test]
    fn nested_rows_are_committed() {
        let (driver, executor) = single(json!([
            { "type": "script", "content": format!("{SOURCE}; CREATE TABLE dst (id INT, label TEXT, rownum INT)") },
            {
                "type": "query",
                "content": "SELECT * FROM src",
                "children": [
                    { "type": "script", "content": "INSERT INTO dst VALUES ($id, $label, $rownum)" }
                ]
            }
        ]));
        let statistics = executor.execute().unwrap();

        let database = driver.database("db");
        assert_eq!(
            database.rows("dst").unwrap(),
            vec![
                row([Value::Int(1), Value::from("One"), Value::Int(0)]),
                row([Value::Int(3), Value::from("Three"), Value::Int(1)]),
            ]
        );
        assert_eq!(
            database.journal(),
            vec![
                JournalEntry::Connected(1),
                JournalEntry::Committed(1),
                JournalEntry::Closed(1),
            ]
        );

        assert_eq!(statistics.element("/etl[1]/script[1]").unwrap().successful, 1);
        assert_eq!(statistics.element("/etl[1]/query[1]").unwrap().successful, 1);
        let nested = statistics.element("/etl[1]/query[1]/script[1]").unwrap();
        assert_eq!((nested.successful, nested.failed), (2, 0));
        assert_eq!(statistics.executed_statements, 7);
        assert!(statistics.finished.is_some());
        assert_eq!(executor.statistics().snapshot(), statistics);
    }

    #[test]
    fn rownum_restarts_for_every_query_execution() {
        let (driver, executor) = single(json!([
            { "type": "script", "content": format!("{SOURCE}; CREATE TABLE seen (outer_row INT, inner_row INT)") },
            {
                "type": "query",
                "content": "SELECT * FROM src",
                "children": [{
                    "type": "script",
                    "content": "DELETE FROM seen",
                    "if": "false"
                }, {
                    "type": "query",
                    "content": "SELECT * FROM src",
                    "children": [
                        { "type": "script", "content": "INSERT INTO seen VALUES ($id, $rownum)" }
                    ]
                }]
            }
        ]));
        let statistics = executor.execute().unwrap();

        let inner: Vec<Value> = driver
            .database("db")
            .rows("seen")
            .unwrap()
            .into_iter()
            .map(|mut row| row.remove(1))
            .collect();
        assert_eq!(inner, row([0, 1, 0, 1].map(Value::Int)));

        let skipped = statistics.element("/etl[1]/query[1]/script[1]").unwrap();
        assert_eq!(skipped.invocations(), 0);
        let inner_query = statistics.element("/etl[1]/query[1]/query[1]").unwrap();
        assert_eq!(inner_query.successful, 2);
        let innermost = statistics.element("/etl[1]/query[1]/query[1]/script[1]").unwrap();
        assert_eq!(innermost.successful, 4);
    }

    #[test]
    fn failure_rolls_back_and_never_commits() {
        let (driver, executor) = single(json!([
            { "type": "script", "content": "CREATE TABLE t (id INT)" },
            { "type": "script", "content": "FAIL 'boom' CODE E1" }
        ]));
        let error = executor.execute().unwrap_err();

        let EtlError::Execution { location, source } = &error else {
            panic!("expected execution failure, got {error:?}");
        };
        assert_eq!(location.as_deref(), Some("/etl[1]/script[2]"));
        assert_eq!(source.codes, vec!["E1".to_string()]);

        let database = driver.database("db");
        assert!(!database.table_exists("t"));
        assert_eq!(
            database.journal(),
            vec![
                JournalEntry::Connected(1),
                JournalEntry::RolledBack(1),
                JournalEntry::Closed(1),
            ]
        );

        let statistics = executor.statistics().snapshot();
        assert_eq!(statistics.element("/etl[1]/script[2]").unwrap().failed, 1);
        assert_eq!(statistics.executed_statements, 2);
    }

    #[test]
    fn continue_policy_keeps_the_run_going() {
        let (driver, executor) = single(json!([
            { "type": "script", "content": "FAIL 'ignored'", "error_policy": "continue" },
            { "type": "script", "content": "CREATE TABLE t (id INT)" }
        ]));
        let statistics = executor.execute().unwrap();

        assert!(driver.database("db").table_exists("t"));
        assert_eq!(statistics.element("/etl[1]/script[1]").unwrap().failed, 1);
    }

    #[test]
    fn handler_runs_fallback_and_retries_once() {
        let (driver, executor) = single(json!([{
            "type": "script",
            "content": "INSERT INTO t VALUES (1)",
            "on_error": [
                { "codes": ["23505"] },
                { "codes": ["42P01"], "content": "CREATE TABLE t (id INT)", "retry": true }
            ]
        }]));
        let statistics = executor.execute().unwrap();

        assert_eq!(driver.database("db").row_count("t"), 1);
        let element = statistics.element("/etl[1]/script[1]").unwrap();
        assert_eq!((element.successful, element.failed), (1, 1));
    }

    #[test]
    fn unmatched_handler_aborts() {
        let (_driver, executor) = single(json!([{
            "type": "script",
            "content": "FAIL 'boom' CODE E2",
            "on_error": [{ "codes": ["E1"] }, { "message": "timeout" }]
        }]));
        let error = executor.execute().unwrap_err();
        assert_eq!(error.location(), Some("/etl[1]/script[1]"));
    }

    #[test]
    fn own_transaction_outlives_run_rollback() {
        let (driver, executor) = single(json!([
            { "type": "script", "content": "CREATE TABLE audit (id INT); INSERT INTO audit VALUES (1)", "new_tx": true },
            { "type": "script", "content": "CREATE TABLE t (id INT)" },
            { "type": "script", "content": "FAIL 'boom'" }
        ]));
        assert!(executor.execute().is_err());

        let database = driver.database("db");
        assert_eq!(database.row_count("audit"), 1);
        assert!(!database.table_exists("t"));
        assert_eq!(
            database.journal(),
            vec![
                JournalEntry::Connected(1),
                JournalEntry::Connected(2),
                JournalEntry::Committed(2),
                JournalEntry::Closed(2),
                JournalEntry::RolledBack(1),
                JournalEntry::Closed(1),
            ]
        );
    }

    #[test]
    fn own_transaction_failure_is_rolled_back_and_swallowed() {
        let (driver, executor) = single(json!([
            { "type": "script", "content": "CREATE TABLE side (id INT); FAIL 'side effect failed'", "new_tx": true },
            { "type": "script", "content": "CREATE TABLE t (id INT)" }
        ]));
        let statistics = executor.execute().unwrap();

        let database = driver.database("db");
        assert!(!database.table_exists("side"));
        assert!(database.table_exists("t"));
        assert!(database.journal().contains(&JournalEntry::RolledBack(2)));
        assert_eq!(statistics.element("/etl[1]/script[1]").unwrap().failed, 1);
        assert_eq!(statistics.executed_statements, 3);
    }

    #[test]
    fn own_transaction_connect_failure_is_swallowed() {
        let (driver, executor) = prepare(json!({
            "connections": [{
                "driver": "memory",
                "url": "db",
                "lazy_init": true,
                "properties": { "fail_connect": "true" }
            }],
            "elements": [{ "type": "script", "content": "CREATE TABLE side (id INT)", "new_tx": true }]
        }));
        let statistics = executor.execute().unwrap();

        assert!(driver.database("db").journal().is_empty());
        assert_eq!(statistics.element("/etl[1]/script[1]").unwrap().invocations(), 0);
        assert_eq!(statistics.executed_statements, 0);
    }

    /// Cancels the run once the last element has been executed.
    struct CancelAfterElements(CancellationToken);

    impl ProgressIndicator for CancelAfterElements {
        fn show_progress(&self, _fraction: f64, message: &str) {
            if message.starts_with("Executed") {
                self.0.cancel();
            }
        }
    }

    #[test]
    fn cancellation_after_the_last_element_prevents_commit() {
        let (driver, executor) = single(json!([
            { "type": "script", "content": "CREATE TABLE t (id INT)" }
        ]));
        let token = executor.cancellation_token();
        let executor = executor.with_progress(Arc::new(CancelAfterElements(token)));
        let error = executor.execute().unwrap_err();

        assert!(matches!(error, EtlError::Cancelled));
        let database = driver.database("db");
        assert!(!database.table_exists("t"));
        assert_eq!(
            database.journal(),
            vec![
                JournalEntry::Connected(1),
                JournalEntry::RolledBack(1),
                JournalEntry::Closed(1),
            ]
        );
    }

    #[test]
    fn condition_skips_without_opening_connections() {
        let config = json!({
            "properties": { "enabled": false },
            "connections": [{ "driver": "memory", "url": "db", "lazy_init": true }],
            "elements": [{ "type": "script", "content": "CREATE TABLE t (id INT)", "if": "enabled" }]
        });

        let (driver, executor) = prepare(config.clone());
        let statistics = executor.execute().unwrap();
        assert!(driver.database("db").journal().is_empty());
        assert_eq!(statistics.element("/etl[1]/script[1]").unwrap().invocations(), 0);

        let (driver, executor) = prepare(config);
        let settings = ExecutorConfig::builder()
            .parameter("enabled", "true")
            .build()
            .unwrap();
        executor.with_settings(settings).execute().unwrap();
        assert!(driver.database("db").table_exists("t"));
    }

    #[test]
    fn dialect_specific_content_is_selected() {
        let (driver, executor) = single(json!([{
            "type": "script",
            "content": [
                { "dialect": { "name": "oracle", "content": "FAIL 'wrong dialect'" } },
                { "dialect": { "name": "memory", "version": "1\\..*", "content": "CREATE TABLE d (id INT);" } },
                { "text": "INSERT INTO d VALUES (1)" }
            ]
        }]));
        executor.execute().unwrap();
        assert_eq!(driver.database("db").row_count("d"), 1);
    }

    #[test]
    fn configuration_file_with_include() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("load.sql"), "CREATE TABLE t (id INT);\nINSERT INTO t VALUES ($id);").unwrap();
        let path = dir.path().join("etl.json");
        let json = json!({
            "properties": { "id": 42 },
            "connections": [{ "driver": "memory", "url": "file" }],
            "elements": [{ "type": "script", "content": [{ "include": "load.sql" }] }]
        });
        std::fs::write(&path, json.to_string()).unwrap();

        let driver = Arc::new(MemoryDriver::new());
        let drivers = DriverRegistry::new().with_driver(driver.clone());
        let config = EtlConfig::from_path(&path).unwrap();
        EtlExecutor::new(config, drivers).execute().unwrap();
        assert_eq!(driver.database("file").rows("t").unwrap(), vec![row([Value::Int(42)])]);
    }

    #[test]
    fn configuration_errors_are_reported_as_such() {
        let (driver, executor) = single(json!([{ "type": "script", "content": "", "if": "(" }]));
        let error = executor.execute().unwrap_err();
        assert!(matches!(error, EtlError::Configuration(_)));
        assert!(driver.database("db").journal().is_empty());
    }

    #[test]
    fn cancellation_from_another_thread_rolls_back() {
        let (driver, executor) = single(json!([
            { "type": "script", "content": format!("{SOURCE}; CREATE TABLE dst (id INT)") },
            {
                "type": "query",
                "content": "SELECT * FROM src",
                "children": [
                    { "type": "script", "content": "SLEEP 300; INSERT INTO dst VALUES ($id)", "error_policy": "continue" }
                ]
            }
        ]));
        let token = executor.cancellation_token();
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            token.cancel();
        });

        let started = Instant::now();
        let error = executor.execute().unwrap_err();
        canceller.join().unwrap();

        assert!(error.is_cancelled());
        assert!(started.elapsed() < Duration::from_secs(1));
        let database = driver.database("db");
        assert!(!database.table_exists("dst"));
        assert_eq!(database.row_count("dst"), 0);
        assert!(!database.journal().contains(&JournalEntry::Committed(1)));
        assert_eq!(database.journal().last(), Some(&JournalEntry::Closed(1)));
    }

    #[test]
    fn cancelled_before_start_opens_nothing() {
        let (driver, executor) = single(json!([{ "type": "script", "content": "CREATE TABLE t (id INT)" }]));
        executor.cancellation_token().cancel();
        assert!(executor.execute().unwrap_err().is_cancelled());
        assert!(driver.database("db").journal().is_empty());
    }

    #[test]
    fn statistics_can_be_disabled() {
        let (_driver, executor) = single(json!([{ "type": "script", "content": "CREATE TABLE t (id INT)" }]));
        let settings = ExecutorConfig::builder().collect_statistics(false).build().unwrap();
        let statistics = executor.with_settings(settings).execute().unwrap();
        assert!(statistics.elements.is_empty());
        assert_eq!(statistics.executed_statements, 1);
    }

    #[test]
    fn progress_reaches_completion() {
        let (_driver, executor) = single(json!([
            { "type": "script", "content": "CREATE TABLE a (id INT)" },
            { "type": "script", "content": "CREATE TABLE b (id INT)" }
        ]));
        let progress = Arc::new(RecordingProgress::default());
        executor.with_progress(progress.clone()).execute().unwrap();

        let fractions: Vec<f64> = progress.0.lock().unwrap().iter().map(|(f, _)| *f).collect();
        assert!(fractions.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(fractions.last(), Some(&1.0));
    }
}
