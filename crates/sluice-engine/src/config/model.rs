//! Serde model of an ETL configuration.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sluice_core::{Error, Result, Value};

/// Declarative description of an ETL run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EtlConfig {
    /// Global parameters visible to every element.
    #[serde(default)]
    pub properties: BTreeMap<String, serde_json::Value>,
    /// Connection declarations, in declaration order.
    #[serde(default)]
    pub connections: Vec<ConnectionDecl>,
    /// Top-level scripts and queries, in document order.
    #[serde(default)]
    pub elements: Vec<ElementDecl>,
    /// Directory includes are resolved against.
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

impl EtlConfig {
    /// Parses a configuration from JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            Error::configuration()
                .with_message(format!("malformed configuration: {e}"))
                .with_source(e)
        })
    }

    /// Reads a configuration file. Includes resolve relative to its directory.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            Error::configuration()
                .with_message(format!("cannot read configuration '{}'", path.display()))
                .with_source(e)
        })?;
        let mut config = Self::from_json(&json)?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        Ok(config)
    }

    /// Returns the directory includes are resolved against.
    pub fn base_dir(&self) -> Option<&Path> {
        self.base_dir.as_deref()
    }

    /// Returns the configured properties as parameter values.
    pub fn property_values(&self) -> impl Iterator<Item = (&str, Value)> {
        self.properties
            .iter()
            .map(|(name, value)| (name.as_str(), property_value(value)))
    }
}

fn property_value(value: &serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => n.as_f64().map_or(Value::Null, Value::Float),
        },
        serde_json::Value::String(s) => Value::Text(s.clone()),
        other => Value::Text(other.to_string()),
    }
}

/// A connection declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionDecl {
    /// Identifier referenced by elements. Optional for a sole connection.
    #[serde(default)]
    pub id: Option<String>,
    /// Name of the registered driver.
    pub driver: String,
    /// Driver-specific URL.
    #[serde(default)]
    pub url: Option<String>,
    /// User name.
    #[serde(default)]
    pub user: Option<String>,
    /// Password.
    #[serde(default)]
    pub password: Option<String>,
    /// Defer opening until first use.
    #[serde(default)]
    pub lazy_init: bool,
    /// Driver properties.
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

/// A script or a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ElementDecl {
    /// Executed once per invocation.
    Script(ScriptDecl),
    /// Executes its children once per produced row.
    Query(QueryDecl),
}

impl ElementDecl {
    /// Returns the tag used in element locations.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Script(_) => "script",
            Self::Query(_) => "query",
        }
    }

    /// Returns the referenced connection id.
    pub fn connection_id(&self) -> Option<&str> {
        match self {
            Self::Script(script) => script.connection_id.as_deref(),
            Self::Query(query) => query.connection_id.as_deref(),
        }
    }

    /// Returns the element content.
    pub fn content(&self) -> &Content {
        match self {
            Self::Script(script) => &script.content,
            Self::Query(query) => &query.content,
        }
    }

    /// Returns the `if` expression.
    pub fn condition(&self) -> Option<&str> {
        match self {
            Self::Script(script) => script.condition.as_deref(),
            Self::Query(query) => query.condition.as_deref(),
        }
    }

    /// Returns the error handlers.
    pub fn on_error(&self) -> &[OnErrorDecl] {
        match self {
            Self::Script(script) => &script.on_error,
            Self::Query(query) => &query.on_error,
        }
    }

    /// Returns the policy for unhandled errors.
    pub fn error_policy(&self) -> ErrorPolicy {
        match self {
            Self::Script(script) => script.error_policy,
            Self::Query(query) => query.error_policy,
        }
    }
}

/// A script declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptDecl {
    /// Connection to execute against; inherited from the parent when absent.
    #[serde(default)]
    pub connection_id: Option<String>,
    /// Script content.
    pub content: Content,
    /// Skip the script unless this expression is true.
    #[serde(default, rename = "if")]
    pub condition: Option<String>,
    /// Error handlers, tried in order.
    #[serde(default)]
    pub on_error: Vec<OnErrorDecl>,
    /// What to do with errors no handler matched.
    #[serde(default)]
    pub error_policy: ErrorPolicy,
    /// Run in a separate, immediately committed transaction.
    #[serde(default)]
    pub new_tx: bool,
}

/// A query declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryDecl {
    /// Connection to execute against; inherited from the parent when absent.
    #[serde(default)]
    pub connection_id: Option<String>,
    /// Query content.
    pub content: Content,
    /// Skip the query unless this expression is true.
    #[serde(default, rename = "if")]
    pub condition: Option<String>,
    /// Error handlers, tried in order.
    #[serde(default)]
    pub on_error: Vec<OnErrorDecl>,
    /// What to do with errors no handler matched.
    #[serde(default)]
    pub error_policy: ErrorPolicy,
    /// Elements executed for every row.
    #[serde(default)]
    pub children: Vec<ElementDecl>,
}

/// Element content: inline text or a list of parts concatenated in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    /// Inline text.
    Text(String),
    /// Parts, some possibly dialect-specific.
    Parts(Vec<ContentPart>),
}

impl Default for Content {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

/// One part of element content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentPart {
    /// Inline text.
    Text(String),
    /// Content used only for matching dialects.
    Dialect(DialectDecl),
    /// Text read from a file, relative to the configuration file.
    Include(PathBuf),
}

/// Dialect-guarded content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialectDecl {
    /// Regular expression the dialect name must match.
    #[serde(default)]
    pub name: Option<String>,
    /// Regular expression the dialect version must match.
    #[serde(default)]
    pub version: Option<String>,
    /// Use the content for every dialect except the matching ones.
    #[serde(default)]
    pub exclude: bool,
    /// Guarded content.
    pub content: Content,
}

/// An error handler declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnErrorDecl {
    /// Regular expression searched in the error messages.
    #[serde(default)]
    pub message: Option<String>,
    /// Vendor codes, any of which must be reported by the error.
    #[serde(default)]
    pub codes: Vec<String>,
    /// Fallback content executed on the element's connection.
    #[serde(default)]
    pub content: Option<Content>,
    /// Execute the element again after the fallback.
    #[serde(default)]
    pub retry: bool,
}

/// What an element does with errors no handler matched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Propagate the error and fail the run.
    #[default]
    Abort,
    /// Log the error and carry on with the next element.
    Continue,
}
