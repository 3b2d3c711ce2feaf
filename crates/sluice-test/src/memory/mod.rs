//! Transactional in-memory driver.

mod database;
mod statement;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub use database::{JournalEntry, MemoryDatabase};
use database::{Change, lock, missing_table};
use sluice_core::{
    Connection, ConnectionParameters, DialectIdentifier, Driver, Error, ParametersCallback,
    QueryCallback, Resource, Result, Value,
};
use statement::{Source, Statement, split};

use crate::TRACING_TARGET;

/// Driver name used in connection declarations.
const DRIVER_NAME: &str = "memory";

/// Property that makes every statement commit immediately.
const PROPERTY_AUTOCOMMIT: &str = "autocommit";

/// Property that makes `rollback` report an unsupported operation.
const PROPERTY_NO_ROLLBACK: &str = "no_rollback";

/// Property that makes `connect` fail.
const PROPERTY_FAIL_CONNECT: &str = "fail_connect";

/// Driver for in-memory databases keyed by connection URL.
///
/// Connections to the same URL share committed state, so tests can open a
/// second connection (or inspect [`MemoryDatabase`]) to observe what a run
/// committed.
#[derive(Debug, Default)]
pub struct MemoryDriver {
    databases: Mutex<HashMap<String, Arc<MemoryDatabase>>>,
}

impl MemoryDriver {
    /// Creates a driver with no databases.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the database for `url`, creating it if needed.
    pub fn database(&self, url: &str) -> Arc<MemoryDatabase> {
        lock(&self.databases)
            .entry(url.to_owned())
            .or_insert_with(|| Arc::new(MemoryDatabase::new(url)))
            .clone()
    }
}

impl Driver for MemoryDriver {
    fn name(&self) -> &str {
        DRIVER_NAME
    }

    fn connect(&self, parameters: &ConnectionParameters) -> Result<Arc<dyn Connection>> {
        if parameters.bool_property(PROPERTY_FAIL_CONNECT) {
            return Err(Error::provider()
                .with_message("connection refused")
                .with_code("08001"));
        }

        let url = parameters.url.as_deref().unwrap_or("default");
        let database = self.database(url);
        let id = database.next_connection_id();
        database.record(JournalEntry::Connected(id));

        tracing::debug!(
            target: TRACING_TARGET,
            connection = id,
            url,
            "memory connection opened"
        );

        Ok(Arc::new(MemoryConnection {
            id,
            database,
            parameters: parameters.clone(),
            state: Mutex::new(ConnectionState::default()),
            statements: AtomicU64::new(0),
        }))
    }
}

#[derive(Debug, Default)]
struct ConnectionState {
    pending: Vec<Change>,
    closed: bool,
}

/// A connection buffering its changes until commit.
#[derive(Debug)]
pub struct MemoryConnection {
    id: u64,
    database: Arc<MemoryDatabase>,
    parameters: ConnectionParameters,
    state: Mutex<ConnectionState>,
    statements: AtomicU64,
}

/// Column lookup over one materialised row.
///
/// Tables never hold streams: parameters are read into text when a row is
/// inserted.
struct Row<'a> {
    columns: &'a [String],
    values: &'a [Value],
}

impl ParametersCallback for Row<'_> {
    fn parameter(&self, name: &str) -> Option<Value> {
        self.columns
            .iter()
            .position(|column| column.eq_ignore_ascii_case(name))
            .and_then(|index| self.values.get(index))
            .and_then(Value::try_clone)
    }
}

impl MemoryConnection {
    /// Returns the connection number within its database.
    pub fn id(&self) -> u64 {
        self.id
    }

    fn run(&self, source: &Source, parameters: &dyn ParametersCallback) -> Result<Option<Statement>> {
        self.parameters.checkpoint()?;
        let text = source.text();
        let statement = Statement::parse(source).map_err(|e| e.with_statement(text))?;
        self.statements.fetch_add(1, Ordering::Relaxed);

        let change = match statement {
            Statement::CreateTable { table, columns } => Change::CreateTable { table, columns },
            Statement::DropTable { table } => Change::DropTable { table },
            Statement::Insert { table, values } => Change::Insert {
                table,
                row: values
                    .iter()
                    .map(|expr| expr.eval(parameters))
                    .collect::<Result<_>>()?,
            },
            Statement::Delete { table } => Change::Delete { table },
            Statement::Fail { message, code } => {
                let mut error = Error::provider().with_message(message);
                if let Some(code) = code {
                    error = error.with_code(code);
                }
                return Err(error.with_statement(text));
            }
            Statement::Sleep { millis } => {
                std::thread::sleep(Duration::from_millis(millis));
                return Ok(None);
            }
            select @ Statement::Select { .. } => return Ok(Some(select)),
        };

        let mut state = lock(&self.state);
        if state.closed {
            return Err(Error::closed().with_message("connection is closed"));
        }
        // Validate against the current view before buffering.
        let mut view = self.database.view(&state.pending)?;
        change.apply(&mut view).map_err(|e| e.with_statement(text))?;
        state.pending.push(change);

        if self.parameters.bool_property(PROPERTY_AUTOCOMMIT) {
            self.database.commit(&state.pending)?;
            state.pending.clear();
        }
        Ok(None)
    }

    fn select(
        &self,
        table: &str,
        filter: Option<&(String, statement::Expr)>,
        parameters: &dyn ParametersCallback,
    ) -> Result<(Vec<String>, Vec<Vec<Value>>)> {
        let state = lock(&self.state);
        if state.closed {
            return Err(Error::closed().with_message("connection is closed"));
        }
        let mut view = self.database.view(&state.pending)?;
        drop(state);

        let source = view.remove(table).ok_or_else(|| missing_table(table))?;
        let rows = match filter {
            Some((column, expr)) => {
                let index = source
                    .columns
                    .iter()
                    .position(|c| c == column)
                    .ok_or_else(|| {
                        Error::provider()
                            .with_message(format!("column '{column}' does not exist"))
                            .with_code("42703")
                    })?;
                let expected = expr.eval(parameters)?;
                source
                    .rows
                    .into_iter()
                    .filter(|row| row.get(index) == Some(&expected))
                    .collect()
            }
            None => source.rows,
        };
        Ok((source.columns, rows))
    }
}

impl Connection for MemoryConnection {
    fn dialect(&self) -> DialectIdentifier {
        DialectIdentifier::new("memory").with_version("1.0")
    }

    fn execute_script(&self, script: &Resource, parameters: &dyn ParametersCallback) -> Result<()> {
        for source in split(script.text())? {
            self.run(&source, parameters)?;
        }
        Ok(())
    }

    fn execute_query(
        &self,
        query: &Resource,
        parameters: &dyn ParametersCallback,
        callback: &mut dyn QueryCallback,
    ) -> Result<()> {
        for source in split(query.text())? {
            let Some(Statement::Select { table, filter }) = self.run(&source, parameters)? else {
                continue;
            };
            let (columns, rows) = self
                .select(&table, filter.as_ref(), parameters)
                .map_err(|e| e.with_statement(source.text()))?;
            for values in &rows {
                callback.process_row(&Row {
                    columns: &columns,
                    values,
                })?;
            }
        }
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        let mut state = lock(&self.state);
        if state.closed {
            return Err(Error::closed().with_message("connection is closed"));
        }
        self.database.commit(&state.pending)?;
        state.pending.clear();
        self.database.record(JournalEntry::Committed(self.id));
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        if self.parameters.bool_property(PROPERTY_NO_ROLLBACK) {
            return Err(Error::unsupported().with_message("rollback is not supported"));
        }
        let mut state = lock(&self.state);
        if state.closed {
            return Err(Error::closed().with_message("connection is closed"));
        }
        state.pending.clear();
        self.database.record(JournalEntry::RolledBack(self.id));
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let mut state = lock(&self.state);
        if state.closed {
            return Ok(());
        }
        state.pending.clear();
        state.closed = true;
        self.database.record(JournalEntry::Closed(self.id));

        tracing::debug!(
            target: TRACING_TARGET,
            connection = self.id,
            "memory connection closed"
        );
        Ok(())
    }

    fn executed_statements(&self) -> u64 {
        self.statements.load(Ordering::Relaxed)
    }
}
