//! Driver registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use sluice_core::{Driver, Error, Result};

/// Drivers available to a run, keyed by [`Driver::name`].
#[derive(Clone, Default)]
pub struct DriverRegistry {
    drivers: HashMap<String, Arc<dyn Driver>>,
}

impl DriverRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a driver, replacing any driver with the same name.
    pub fn register(&mut self, driver: Arc<dyn Driver>) {
        self.drivers.insert(driver.name().to_owned(), driver);
    }

    /// Registers a driver and returns the registry.
    #[must_use]
    pub fn with_driver(mut self, driver: Arc<dyn Driver>) -> Self {
        self.register(driver);
        self
    }

    /// Returns the driver registered under `name`.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Driver>> {
        self.drivers.get(name).cloned().ok_or_else(|| {
            Error::configuration().with_message(format!("driver '{name}' is not registered"))
        })
    }
}

impl fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.drivers.keys().collect();
        names.sort();
        f.debug_struct("DriverRegistry")
            .field("drivers", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use sluice_test::MemoryDriver;

    use super::*;

    #[test]
    fn lookup_by_name() {
        let registry = DriverRegistry::new().with_driver(Arc::new(MemoryDriver::new()));
        assert_eq!(registry.get("memory").unwrap().name(), "memory");

        let error = registry.get("oracle").err().unwrap();
        assert_eq!(error.kind(), sluice_core::ErrorKind::Configuration);
    }
}
