//! Script executor.

use sluice_core::Result;

use super::ContentResolver;
use crate::context::DynamicContext;
use crate::element::Executable;

/// Executes its content once per invocation on the scope's connection.
#[derive(Debug)]
pub(crate) struct ScriptExecutor {
    content: ContentResolver,
}

impl ScriptExecutor {
    pub(crate) fn new(content: ContentResolver) -> Self {
        Self { content }
    }
}

impl Executable for ScriptExecutor {
    fn execute(&self, ctx: &DynamicContext<'_>) -> Result<()> {
        let connection = ctx.connection()?;
        let script = self.content.resolve(&connection.dialect());
        connection.execute_script(&script, ctx)
    }
}
