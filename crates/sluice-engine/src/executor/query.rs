//! Query executor and per-row scopes.

use std::cell::RefCell;
use std::collections::HashMap;

use sluice_core::{ParametersCallback, QueryCallback, Result, Value};

use super::ContentResolver;
use crate::TRACING_TARGET_ELEMENT;
use crate::context::DynamicContext;
use crate::element::{Executable, ExecutableElement};

/// Name of the row counter visible to nested elements.
const ROWNUM: &str = "rownum";

/// Executes a query and its nested elements once per produced row.
#[derive(Debug)]
pub(crate) struct QueryExecutor {
    content: ContentResolver,
    children: Vec<ExecutableElement>,
}

impl QueryExecutor {
    pub(crate) fn new(content: ContentResolver, children: Vec<ExecutableElement>) -> Self {
        Self { content, children }
    }
}

impl Executable for QueryExecutor {
    fn execute(&self, ctx: &DynamicContext<'_>) -> Result<()> {
        let connection = ctx.connection()?;
        let query = self.content.resolve(&connection.dialect());
        let mut rows = RowProcessor {
            ctx,
            children: &self.children,
            rownum: 0,
        };
        connection.execute_query(&query, ctx, &mut rows)?;

        tracing::trace!(
            target: TRACING_TARGET_ELEMENT,
            origin = query.origin().unwrap_or_default(),
            rows = rows.rownum,
            "Query completed"
        );
        Ok(())
    }
}

/// Runs the nested elements for every row the driver produces.
struct RowProcessor<'a, 'b> {
    ctx: &'a DynamicContext<'b>,
    children: &'a [ExecutableElement],
    rownum: i64,
}

impl QueryCallback for RowProcessor<'_, '_> {
    fn process_row(&mut self, row: &dyn ParametersCallback) -> Result<()> {
        self.ctx.checkpoint()?;
        tracing::trace!(target: TRACING_TARGET_ELEMENT, rownum = self.rownum, "Processing row");
        let scope = RowScope::new(self.rownum, row);
        self.rownum += 1;

        let child = self.ctx.with_parameters(&scope);
        for element in self.children {
            element.execute(&child)?;
        }
        Ok(())
    }
}

/// Parameters of one row: `rownum`, then the row's columns. Names the row
/// does not define are answered by the enclosing scope.
///
/// Values other than streams are cached on first lookup; streams can only be
/// read once and are fetched again on every lookup.
struct RowScope<'a> {
    rownum: i64,
    row: &'a dyn ParametersCallback,
    cache: RefCell<HashMap<String, Value>>,
}

impl<'a> RowScope<'a> {
    fn new(rownum: i64, row: &'a dyn ParametersCallback) -> Self {
        Self {
            rownum,
            row,
            cache: RefCell::new(HashMap::new()),
        }
    }
}

impl ParametersCallback for RowScope<'_> {
    fn parameter(&self, name: &str) -> Option<Value> {
        if name == ROWNUM {
            return Some(Value::Int(self.rownum));
        }
        if let Some(value) = self.cache.borrow().get(name).and_then(Value::try_clone) {
            return Some(value);
        }

        let value = self.row.parameter(name)?;
        if let Some(copy) = value.try_clone() {
            self.cache.borrow_mut().insert(name.to_owned(), copy);
        }
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::io::Cursor;

    use sluice_core::{Parameters, ValueStream};

    use super::*;
    use crate::context::EtlContext;

    /// Row counting how often each column is read.
    struct CountingRow {
        reads: Cell<usize>,
    }

    impl ParametersCallback for CountingRow {
        fn parameter(&self, name: &str) -> Option<Value> {
            self.reads.set(self.reads.get() + 1);
            match name {
                "id" => Some(Value::Int(1)),
                "blob" => Some(Value::Stream(ValueStream::new(Cursor::new(b"data".to_vec())))),
                _ => None,
            }
        }
    }

    #[test]
    fn rownum_shadows_everything() {
        let row = Parameters::new().with("rownum", 99);
        let scope = RowScope::new(4, &row);
        assert_eq!(scope.parameter("rownum"), Some(Value::Int(4)));
    }

    #[test]
    fn scalars_are_cached_streams_are_not() {
        let row = CountingRow {
            reads: Cell::new(0),
        };
        let scope = RowScope::new(0, &row);

        assert_eq!(scope.parameter("id"), Some(Value::Int(1)));
        assert_eq!(scope.parameter("id"), Some(Value::Int(1)));
        assert_eq!(row.reads.get(), 1);

        assert!(scope.parameter("blob").is_some_and(|v| v.is_stream()));
        assert!(scope.parameter("blob").is_some_and(|v| v.is_stream()));
        assert_eq!(row.reads.get(), 3);
    }

    #[test]
    fn missing_columns_fall_back_to_the_enclosing_scope() {
        let etl = EtlContext::new(Parameters::new().with("table", "orders").with("id", 0));
        let root = DynamicContext::new(&etl);
        let row = Parameters::new().with("id", 1);
        let scope = RowScope::new(0, &row);
        let child = root.with_parameters(&scope);

        assert_eq!(child.parameter("id"), Some(Value::Int(1)));
        assert_eq!(child.parameter("table"), Some(Value::from("orders")));
        assert_eq!(child.parameter("unknown"), None);
    }
}
