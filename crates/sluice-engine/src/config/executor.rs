//! Executor settings.

use std::collections::BTreeMap;

use derive_builder::Builder;
use sluice_core::Value;

/// Per-run settings of an [`EtlExecutor`].
///
/// [`EtlExecutor`]: crate::EtlExecutor
#[derive(Debug, Clone, Builder)]
#[builder(pattern = "owned", setter(into), build_fn(validate = "Self::validate"))]
pub struct ExecutorConfig {
    /// External parameters. They override configuration properties of the
    /// same name.
    #[builder(default, setter(custom))]
    pub parameters: BTreeMap<String, String>,

    /// Record per-element statistics.
    #[builder(default = "true")]
    pub collect_statistics: bool,
}

impl ExecutorConfig {
    /// Returns a builder with default settings.
    pub fn builder() -> ExecutorConfigBuilder {
        ExecutorConfigBuilder::default()
    }

    /// Returns the external parameters as parameter values.
    pub fn parameter_values(&self) -> impl Iterator<Item = (&str, Value)> {
        self.parameters
            .iter()
            .map(|(name, value)| (name.as_str(), Value::Text(value.clone())))
    }
}

impl ExecutorConfigBuilder {
    /// Adds an external parameter.
    pub fn parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), value.into());
        self
    }

    /// Adds external parameters.
    pub fn parameters<I, K, V>(mut self, parameters: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let target = self.parameters.get_or_insert_with(BTreeMap::new);
        for (name, value) in parameters {
            target.insert(name.into(), value.into());
        }
        self
    }

    fn validate(&self) -> Result<(), String> {
        if let Some(parameters) = &self.parameters
            && parameters.keys().any(|name| name.trim().is_empty())
        {
            return Err("parameter names must not be empty".into());
        }
        Ok(())
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            parameters: BTreeMap::new(),
            collect_statistics: true,
        }
    }
}
