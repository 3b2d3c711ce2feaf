//! Session: connection managers and prepared elements of one run.

use std::collections::HashSet;
use std::sync::Arc;

use sluice_core::{ConnectionParameters, Error, Result};

use crate::config::EtlConfig;
use crate::connection::{ConnectionManager, DriverRegistry};
use crate::context::{DynamicContext, EtlContext};
use crate::element::{ElementBuilder, Executable, ExecutableElement};
use crate::location::Location;
use crate::progress::{WEIGHT_CONNECT, WEIGHT_EXECUTE, WEIGHT_PREPARE};
use crate::{TRACING_TARGET_ELEMENT, TRACING_TARGET_SESSION};

/// Returns the manager for `id`.
///
/// A sole manager is returned whatever `id` is; otherwise `id` is required
/// and must match a declared connection exactly.
pub(crate) fn select_manager<'a>(
    managers: &'a [Arc<ConnectionManager>],
    id: Option<&str>,
) -> Result<&'a Arc<ConnectionManager>> {
    match (managers, id) {
        ([], _) => Err(Error::configuration().with_message("no connections are declared")),
        ([sole], _) => Ok(sole),
        (_, None) => Err(Error::configuration().with_message(format!(
            "a connection id is required when {} connections are declared",
            managers.len()
        ))),
        (_, Some(id)) => managers
            .iter()
            .find(|manager| manager.id() == Some(id))
            .ok_or_else(|| {
                Error::configuration().with_message(format!("connection '{id}' is not declared"))
            }),
    }
}

/// Connection managers and prepared top-level elements of a run.
///
/// Creating a session validates the whole configuration and prepares every
/// element before any connection is opened. Closing it closes every manager;
/// afterwards the managers are gone and closing again does nothing.
#[derive(Debug)]
pub struct Session {
    managers: Option<Vec<Arc<ConnectionManager>>>,
    elements: Vec<ExecutableElement>,
    closed_statements: u64,
}

impl Session {
    /// Creates managers, prepares elements in document order, then opens
    /// every connection not declared `lazy_init`.
    pub fn new(config: &EtlConfig, etl: &EtlContext, drivers: &DriverRegistry) -> Result<Self> {
        let managers = create_managers(config, etl, drivers)?;

        let builder = ElementBuilder::new(&managers, etl, config.base_dir());
        let elements = builder.build_all(&config.elements, &Location::root(), None)?;
        etl.progress().advance(
            WEIGHT_PREPARE,
            &format!("Prepared {} elements", elements.len()),
        );

        let mut session = Self {
            managers: Some(managers),
            elements,
            closed_statements: 0,
        };
        if let Err(error) = session.open_eager(etl) {
            session.close();
            return Err(error);
        }
        Ok(session)
    }

    fn open_eager(&self, etl: &EtlContext) -> Result<()> {
        let managers = self.managers()?;
        let weight = WEIGHT_CONNECT / managers.len().max(1) as f64;
        for manager in managers {
            let id = manager.id().unwrap_or("<default>");
            if manager.is_lazy() {
                etl.progress().advance(weight, &format!("Connection {id} deferred"));
                continue;
            }
            etl.checkpoint()?;
            let dialect = manager.open()?;
            etl.progress()
                .advance(weight, &format!("Connection {id} opened, dialect {dialect}"));
        }
        Ok(())
    }

    fn managers(&self) -> Result<&[Arc<ConnectionManager>]> {
        self.managers
            .as_deref()
            .ok_or_else(|| Error::closed().with_message("session is closed"))
    }

    /// Returns the prepared top-level elements.
    pub fn elements(&self) -> &[ExecutableElement] {
        &self.elements
    }

    /// Returns the manager for `id`.
    ///
    /// A sole connection is returned for any id; otherwise `id` must name a
    /// declared connection.
    pub fn connection_manager(&self, id: Option<&str>) -> Result<&Arc<ConnectionManager>> {
        select_manager(self.managers()?, id)
    }

    /// Executes the top-level elements in order on the calling thread.
    pub fn execute(&self, ctx: &DynamicContext<'_>) -> Result<()> {
        self.managers()?;
        let weight = WEIGHT_EXECUTE / self.elements.len().max(1) as f64;
        for element in &self.elements {
            ctx.checkpoint()?;
            tracing::debug!(
                target: TRACING_TARGET_ELEMENT,
                location = %element.location(),
                "Executing element"
            );
            element.execute(ctx)?;
            ctx.etl()
                .progress()
                .advance(weight, &format!("Executed {}", element.location()));
        }
        Ok(())
    }

    /// Commits every connection, stopping at the first failure.
    pub fn commit(&self) -> Result<()> {
        for manager in self.managers()? {
            manager.commit()?;
        }
        Ok(())
    }

    /// Rolls back and closes every connection.
    ///
    /// Every manager is attempted; the first failure is returned.
    pub fn rollback(&self) -> Result<()> {
        let mut first = None;
        for manager in self.managers()? {
            if let Err(error) = manager.rollback() {
                tracing::warn!(
                    target: TRACING_TARGET_SESSION,
                    connection = manager.id().unwrap_or_default(),
                    error = %error,
                    "Rollback failed"
                );
                first.get_or_insert(error);
            }
        }
        first.map_or(Ok(()), Err)
    }

    /// Closes every connection. Failures are logged. Idempotent.
    pub fn close(&mut self) {
        let Some(managers) = self.managers.take() else {
            return;
        };
        for manager in &managers {
            if let Err(error) = manager.close() {
                tracing::warn!(
                    target: TRACING_TARGET_SESSION,
                    connection = manager.id().unwrap_or_default(),
                    error = %error,
                    "Close failed"
                );
            }
            self.closed_statements += manager.executed_statements();
        }
        tracing::debug!(
            target: TRACING_TARGET_SESSION,
            connections = managers.len(),
            "Session closed"
        );
    }

    /// Returns true once the session has been closed.
    pub fn is_closed(&self) -> bool {
        self.managers.is_none()
    }

    /// Returns the number of statements executed over all connections.
    pub fn executed_statements(&self) -> u64 {
        self.managers.as_deref().map_or(self.closed_statements, |managers| {
            managers.iter().map(|m| m.executed_statements()).sum()
        })
    }
}

fn create_managers(
    config: &EtlConfig,
    etl: &EtlContext,
    drivers: &DriverRegistry,
) -> Result<Vec<Arc<ConnectionManager>>> {
    let multiple = config.connections.len() > 1;
    let mut ids = HashSet::new();
    let mut managers = Vec::with_capacity(config.connections.len());

    for decl in &config.connections {
        match decl.id.as_deref() {
            Some(id) if !ids.insert(id) => {
                return Err(Error::configuration()
                    .with_message(format!("connection '{id}' is declared more than once")));
            }
            None if multiple => {
                return Err(Error::configuration().with_message(
                    "every connection needs an id when several connections are declared",
                ));
            }
            _ => {}
        }

        let driver = drivers.get(&decl.driver)?;
        let parameters = ConnectionParameters {
            id: decl.id.clone(),
            url: decl.url.clone(),
            user: decl.user.clone(),
            password: decl.password.clone(),
            properties: decl.properties.clone(),
            cancellation: etl.cancellation().clone(),
        };
        managers.push(Arc::new(ConnectionManager::new(driver, parameters, decl.lazy_init)));
    }

    tracing::debug!(
        target: TRACING_TARGET_SESSION,
        run_id = %etl.run_id(),
        connections = managers.len(),
        "Connection managers created"
    );
    Ok(managers)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use sluice_core::{ErrorKind, Parameters};
    use sluice_test::{JournalEntry, MemoryDriver};

    use super::*;

    fn config(value: serde_json::Value) -> EtlConfig {
        EtlConfig::from_json(&value.to_string()).unwrap()
    }

    fn setup() -> (Arc<MemoryDriver>, DriverRegistry, EtlContext) {
        let driver = Arc::new(MemoryDriver::new());
        let drivers = DriverRegistry::new().with_driver(driver.clone());
        (driver, drivers, EtlContext::new(Parameters::new()))
    }

    #[test]
    fn sole_connection_answers_any_id() {
        let (_driver, drivers, etl) = setup();
        let config = config(json!({
            "connections": [{ "id": "db", "driver": "memory", "url": "db" }]
        }));
        let session = Session::new(&config, &etl, &drivers).unwrap();

        for id in [None, Some("db"), Some("other")] {
            assert_eq!(session.connection_manager(id).unwrap().id(), Some("db"));
        }
    }

    #[test]
    fn several_connections_require_an_exact_id() {
        let (_driver, drivers, etl) = setup();
        let config = config(json!({
            "connections": [
                { "id": "a", "driver": "memory", "url": "a" },
                { "id": "b", "driver": "memory", "url": "b" }
            ]
        }));
        let session = Session::new(&config, &etl, &drivers).unwrap();

        assert_eq!(session.connection_manager(Some("b")).unwrap().id(), Some("b"));
        let missing = session.connection_manager(None).unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::Configuration);
        let unknown = session.connection_manager(Some("c")).unwrap_err();
        assert_eq!(unknown.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn configuration_errors_precede_connections() {
        let (driver, drivers, etl) = setup();
        let cases = [
            json!({
                "connections": [{ "id": "db", "driver": "memory", "url": "db" }],
                "elements": [{ "type": "script", "content": "", "if": "a ==" }]
            }),
            json!({
                "connections": [{ "id": "db", "driver": "memory", "url": "db" }],
                "elements": [{ "type": "script", "content": "", "on_error": [{ "message": "(" }] }]
            }),
            json!({
                "connections": [
                    { "id": "db", "driver": "memory", "url": "db" },
                    { "id": "db", "driver": "memory", "url": "db" }
                ]
            }),
            json!({
                "connections": [
                    { "id": "db", "driver": "memory", "url": "db" },
                    { "id": "other", "driver": "memory", "url": "db" }
                ],
                "elements": [{ "type": "script", "content": "" }]
            }),
            json!({
                "connections": [{ "driver": "oracle", "url": "db" }]
            })
        ];

        for case in cases {
            let error = Session::new(&config(case.clone()), &etl, &drivers).unwrap_err();
            assert_eq!(error.kind(), ErrorKind::Configuration, "{case}");
        }
        assert!(driver.database("db").journal().is_empty());
    }

    #[test]
    fn eager_connections_open_lazy_ones_wait() {
        let (driver, drivers, etl) = setup();
        let config = config(json!({
            "connections": [
                { "id": "eager", "driver": "memory", "url": "eager" },
                { "id": "lazy", "driver": "memory", "url": "lazy", "lazy_init": true }
            ]
        }));
        let mut session = Session::new(&config, &etl, &drivers).unwrap();
        assert_eq!(driver.database("eager").journal(), vec![JournalEntry::Connected(1)]);
        assert!(driver.database("lazy").journal().is_empty());

        session.close();
        session.close();
        assert!(session.is_closed());
        assert_eq!(
            driver.database("eager").journal(),
            vec![JournalEntry::Connected(1), JournalEntry::Closed(1)]
        );
        assert_eq!(
            session.connection_manager(None).unwrap_err().kind(),
            ErrorKind::Closed
        );
    }

    #[test]
    fn failed_connect_closes_opened_managers() {
        let (driver, drivers, etl) = setup();
        let config = config(json!({
            "connections": [
                { "id": "ok", "driver": "memory", "url": "ok" },
                { "id": "bad", "driver": "memory", "url": "bad", "properties": { "fail_connect": "true" } }
            ]
        }));
        let error = Session::new(&config, &etl, &drivers).unwrap_err();
        assert_eq!(error.codes, vec!["08001".to_string()]);
        assert_eq!(
            driver.database("ok").journal(),
            vec![JournalEntry::Connected(1), JournalEntry::Closed(1)]
        );
    }

    #[test]
    fn rollback_closes_every_connection_and_counts_statements() {
        let (driver, drivers, etl) = setup();
        let config = config(json!({
            "connections": [{ "driver": "memory", "url": "db" }],
            "elements": [{ "type": "script", "content": "CREATE TABLE t (id INT); INSERT INTO t VALUES (1)" }]
        }));
        let mut session = Session::new(&config, &etl, &drivers).unwrap();
        session.execute(&DynamicContext::new(&etl)).unwrap();
        assert_eq!(session.executed_statements(), 2);

        session.rollback().unwrap();
        session.close();
        assert_eq!(session.executed_statements(), 2);
        assert!(!driver.database("db").table_exists("t"));
        assert_eq!(
            driver.database("db").journal(),
            vec![
                JournalEntry::Connected(1),
                JournalEntry::RolledBack(1),
                JournalEntry::Closed(1),
            ]
        );
    }
}
