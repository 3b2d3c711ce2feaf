//! Shared committed state of an in-memory database.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use derive_more::Display;
use sluice_core::{Error, Result, Value};

/// A connection lifecycle event recorded by the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum JournalEntry {
    /// Connection `n` was opened.
    #[display("connected({_0})")]
    Connected(u64),
    /// Connection `n` committed.
    #[display("committed({_0})")]
    Committed(u64),
    /// Connection `n` rolled back.
    #[display("rolled_back({_0})")]
    RolledBack(u64),
    /// Connection `n` was closed.
    #[display("closed({_0})")]
    Closed(u64),
}

#[derive(Debug, Default)]
pub(crate) struct Table {
    pub(crate) columns: Vec<String>,
    pub(crate) rows: Vec<Vec<Value>>,
}

impl Clone for Table {
    fn clone(&self) -> Self {
        Self {
            columns: self.columns.clone(),
            rows: self.rows.iter().map(|row| copy_row(row)).collect(),
        }
    }
}

pub(crate) type Tables = BTreeMap<String, Table>;

fn copy_row(row: &[Value]) -> Vec<Value> {
    row.iter()
        .map(|value| value.try_clone().unwrap_or(Value::Null))
        .collect()
}

/// A buffered modification, applied to the committed state on commit.
#[derive(Debug)]
pub(crate) enum Change {
    CreateTable { table: String, columns: Vec<String> },
    DropTable { table: String },
    Insert { table: String, row: Vec<Value> },
    Delete { table: String },
}

impl Change {
    pub(crate) fn apply(&self, tables: &mut Tables) -> Result<()> {
        match self {
            Self::CreateTable { table, columns } => {
                if tables.contains_key(table) {
                    return Err(Error::provider()
                        .with_message(format!("table '{table}' already exists"))
                        .with_code("42P07"));
                }
                tables.insert(
                    table.clone(),
                    Table {
                        columns: columns.clone(),
                        rows: Vec::new(),
                    },
                );
            }
            Self::DropTable { table } => {
                tables.remove(table).ok_or_else(|| missing_table(table))?;
            }
            Self::Insert { table, row } => {
                let target = tables.get_mut(table).ok_or_else(|| missing_table(table))?;
                if target.columns.len() != row.len() {
                    return Err(Error::provider()
                        .with_message(format!(
                            "table '{table}' has {} columns but {} values were supplied",
                            target.columns.len(),
                            row.len()
                        ))
                        .with_code("21S01"));
                }
                target.rows.push(copy_row(row));
            }
            Self::Delete { table } => {
                tables
                    .get_mut(table)
                    .ok_or_else(|| missing_table(table))?
                    .rows
                    .clear();
            }
        }
        Ok(())
    }
}

pub(crate) fn missing_table(table: &str) -> Error {
    Error::provider()
        .with_message(format!("table '{table}' does not exist"))
        .with_code("42P01")
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Committed tables and lifecycle journal shared by all connections to the
/// same URL.
#[derive(Debug)]
pub struct MemoryDatabase {
    name: String,
    committed: Mutex<Tables>,
    journal: Mutex<Vec<JournalEntry>>,
    next_connection: AtomicU64,
}

impl MemoryDatabase {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            committed: Mutex::new(Tables::new()),
            journal: Mutex::new(Vec::new()),
            next_connection: AtomicU64::new(0),
        }
    }

    /// Returns the database name (the connection URL).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true if a committed table with this name exists.
    pub fn table_exists(&self, table: &str) -> bool {
        lock(&self.committed).contains_key(&table.to_ascii_lowercase())
    }

    /// Returns the committed rows of a table.
    pub fn rows(&self, table: &str) -> Option<Vec<Vec<Value>>> {
        lock(&self.committed)
            .get(&table.to_ascii_lowercase())
            .map(|t| t.rows.iter().map(|row| copy_row(row)).collect())
    }

    /// Returns the number of committed rows, zero for missing tables.
    pub fn row_count(&self, table: &str) -> usize {
        lock(&self.committed)
            .get(&table.to_ascii_lowercase())
            .map_or(0, |t| t.rows.len())
    }

    /// Returns the recorded lifecycle events in order.
    pub fn journal(&self) -> Vec<JournalEntry> {
        lock(&self.journal).clone()
    }

    pub(crate) fn record(&self, entry: JournalEntry) {
        lock(&self.journal).push(entry);
    }

    pub(crate) fn next_connection_id(&self) -> u64 {
        self.next_connection.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Returns the committed state with `pending` replayed on top.
    pub(crate) fn view(&self, pending: &[Change]) -> Result<Tables> {
        let mut tables = lock(&self.committed).clone();
        for change in pending {
            change.apply(&mut tables)?;
        }
        Ok(tables)
    }

    /// Applies `pending` atomically to the committed state.
    pub(crate) fn commit(&self, pending: &[Change]) -> Result<()> {
        let mut committed = lock(&self.committed);
        let mut tables = committed.clone();
        for change in pending {
            change.apply(&mut tables)?;
        }
        *committed = tables;
        Ok(())
    }
}
