//! Script and query executors.

mod content;
mod query;
mod script;

pub(crate) use content::ContentResolver;
pub(crate) use query::QueryExecutor;
pub(crate) use script::ScriptExecutor;
