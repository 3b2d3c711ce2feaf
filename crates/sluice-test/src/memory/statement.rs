//! Statement language understood by the in-memory driver.
//!
//! Scripts are tokenized and parsed with `sqlparser` using the PostgreSQL
//! dialect; only a small subset of its AST is accepted. Two directives that
//! are not SQL, `FAIL` and `SLEEP`, are recognised from the tokens before
//! parsing.

use sluice_core::{Error, ParametersCallback, Result, Value};
use sqlparser::ast as sql_ast;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Token, Tokenizer, Whitespace};

/// A parsed statement.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Statement {
    CreateTable { table: String, columns: Vec<String> },
    DropTable { table: String },
    Insert { table: String, values: Vec<Expr> },
    Delete { table: String },
    Select { table: String, filter: Option<(String, Expr)> },
    Fail { message: String, code: Option<String> },
    Sleep { millis: u64 },
}

/// A value expression.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Param(String),
}

impl Expr {
    /// Evaluates the expression, reading parameter references from `parameters`.
    pub(crate) fn eval(&self, parameters: &dyn ParametersCallback) -> Result<Value> {
        Ok(match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::Int(*i),
            Self::Float(f) => Value::Float(*f),
            Self::Text(s) => Value::Text(s.clone()),
            Self::Param(name) => match parameters.parameter(name) {
                Some(Value::Stream(stream)) => {
                    let bytes = stream.read_all()?;
                    Value::Text(String::from_utf8_lossy(&bytes).into_owned())
                }
                Some(value) => value,
                None => Value::Null,
            },
        })
    }
}

/// The tokens of one statement of a script.
#[derive(Debug, Clone)]
pub(crate) struct Source {
    text: String,
    tokens: Vec<Token>,
}

impl Source {
    fn new(tokens: Vec<Token>) -> Self {
        let text = tokens.iter().map(Token::to_string).collect::<String>();
        Self {
            text: text.trim().to_owned(),
            tokens,
        }
    }

    /// Returns the statement text, without comments.
    pub(crate) fn text(&self) -> &str {
        &self.text
    }

    fn significant(&self) -> impl Iterator<Item = &Token> {
        self.tokens
            .iter()
            .filter(|token| !matches!(token, Token::Whitespace(_)))
    }
}

/// Splits script text into statements on `;`, dropping comments and blank
/// statements.
pub(crate) fn split(text: &str) -> Result<Vec<Source>> {
    let tokens = Tokenizer::new(&PostgreSqlDialect {}, text)
        .tokenize()
        .map_err(|e| syntax_error(e.to_string()).with_source(e))?;

    let mut statements = vec![Vec::new()];
    for token in tokens {
        match token {
            Token::SemiColon => statements.push(Vec::new()),
            Token::Whitespace(Whitespace::SingleLineComment { .. })
            | Token::Whitespace(Whitespace::MultiLineComment(_)) => {
                if let Some(current) = statements.last_mut() {
                    current.push(Token::Whitespace(Whitespace::Newline));
                }
            }
            token => {
                if let Some(current) = statements.last_mut() {
                    current.push(token);
                }
            }
        }
    }

    Ok(statements
        .into_iter()
        .map(Source::new)
        .filter(|source| source.significant().next().is_some())
        .collect())
}

fn syntax_error(message: impl Into<String>) -> Error {
    Error::provider().with_message(message).with_code("42000")
}

fn unsupported(what: impl std::fmt::Display) -> Error {
    syntax_error(format!("unsupported {what}"))
}

impl Statement {
    /// Parses a single statement.
    pub(crate) fn parse(source: &Source) -> Result<Self> {
        if let Some(directive) = Self::directive(source)? {
            return Ok(directive);
        }

        let dialect = PostgreSqlDialect {};
        let mut parser = Parser::new(&dialect).with_tokens(source.tokens.clone());
        let statement = parser
            .parse_statement()
            .map_err(|e| syntax_error(e.to_string()).with_source(e))?;
        let rest = parser.peek_token();
        if rest.token != Token::EOF {
            return Err(syntax_error(format!("unexpected {}", rest.token)));
        }

        match statement {
            sql_ast::Statement::CreateTable(create) => Ok(Self::CreateTable {
                table: table_name(&create.name)?,
                columns: create
                    .columns
                    .iter()
                    .map(|column| identifier(&column.name))
                    .collect(),
            }),
            sql_ast::Statement::Drop {
                object_type: sql_ast::ObjectType::Table,
                names,
                ..
            } => match names.as_slice() {
                [name] => Ok(Self::DropTable {
                    table: table_name(name)?,
                }),
                _ => Err(unsupported("DROP of several tables")),
            },
            sql_ast::Statement::Insert(insert) => Self::insert(insert),
            sql_ast::Statement::Delete(delete) => Self::delete(delete),
            sql_ast::Statement::Query(query) => Self::select(*query),
            other => Err(unsupported(format!("statement '{other}'"))),
        }
    }

    /// Recognises the `FAIL 'message' [CODE code]` and `SLEEP millis`
    /// directives.
    fn directive(source: &Source) -> Result<Option<Self>> {
        let mut tokens = source.significant();
        let verb = match tokens.next() {
            Some(Token::Word(word)) => word.value.to_ascii_uppercase(),
            _ => return Ok(None),
        };

        let directive = match verb.as_str() {
            "FAIL" => {
                let message = match tokens.next() {
                    Some(Token::SingleQuotedString(message)) => message.clone(),
                    other => return Err(expected("message", other)),
                };
                let code = match tokens.next() {
                    Some(Token::Word(word)) if word.value.eq_ignore_ascii_case("CODE") => {
                        match tokens.next() {
                            Some(Token::Word(code)) => Some(code.value.clone()),
                            Some(Token::Number(code, _) | Token::SingleQuotedString(code)) => {
                                Some(code.clone())
                            }
                            other => return Err(expected("code", other)),
                        }
                    }
                    None => None,
                    Some(other) => return Err(syntax_error(format!("unexpected {other}"))),
                };
                Self::Fail { message, code }
            }
            "SLEEP" => match tokens.next() {
                Some(Token::Number(number, _)) => Self::Sleep {
                    millis: number
                        .parse()
                        .map_err(|_| syntax_error(format!("invalid duration '{number}'")))?,
                },
                other => return Err(expected("duration", other)),
            },
            _ => return Ok(None),
        };

        match tokens.next() {
            None => Ok(Some(directive)),
            Some(token) => Err(syntax_error(format!("unexpected {token}"))),
        }
    }

    fn insert(insert: sql_ast::Insert) -> Result<Self> {
        if !insert.columns.is_empty() {
            return Err(unsupported("INSERT column list"));
        }
        let Some(source) = insert.source else {
            return Err(syntax_error("INSERT requires VALUES"));
        };
        let sql_ast::SetExpr::Values(values) = *source.body else {
            return Err(unsupported("INSERT source, only VALUES is accepted"));
        };
        let row = match <[_; 1]>::try_from(values.rows) {
            Ok([row]) => row,
            Err(_) => return Err(unsupported("multi-row INSERT")),
        };

        Ok(Self::Insert {
            table: insert.table.to_string().to_ascii_lowercase(),
            values: row.into_iter().map(value).collect::<Result<_>>()?,
        })
    }

    fn delete(delete: sql_ast::Delete) -> Result<Self> {
        if delete.selection.is_some() {
            return Err(unsupported("DELETE with WHERE"));
        }
        let tables = match delete.from {
            sql_ast::FromTable::WithFromKeyword(tables)
            | sql_ast::FromTable::WithoutKeyword(tables) => tables,
        };
        match tables.as_slice() {
            [sql_ast::TableWithJoins {
                relation: sql_ast::TableFactor::Table { name, .. },
                joins,
                ..
            }] if joins.is_empty() => Ok(Self::Delete {
                table: table_name(name)?,
            }),
            _ => Err(unsupported("DELETE target")),
        }
    }

    fn select(query: sql_ast::Query) -> Result<Self> {
        if query.order_by.is_some() || query.limit_clause.is_some() {
            return Err(unsupported("ORDER BY or LIMIT"));
        }
        let sql_ast::SetExpr::Select(select) = *query.body else {
            return Err(unsupported("query, only SELECT is accepted"));
        };
        if !matches!(select.projection.as_slice(), [sql_ast::SelectItem::Wildcard(_)]) {
            return Err(unsupported("projection, only * is accepted"));
        }

        let table = match select.from.as_slice() {
            [sql_ast::TableWithJoins {
                relation: sql_ast::TableFactor::Table { name, .. },
                joins,
                ..
            }] if joins.is_empty() => table_name(name)?,
            _ => return Err(unsupported("FROM clause")),
        };

        let filter = match select.selection {
            None => None,
            Some(sql_ast::Expr::BinaryOp {
                left,
                op: sql_ast::BinaryOperator::Eq,
                right,
            }) => match *left {
                sql_ast::Expr::Identifier(column) => Some((identifier(&column), value(*right)?)),
                other => return Err(unsupported(format!("filter column '{other}'"))),
            },
            Some(other) => return Err(unsupported(format!("filter '{other}'"))),
        };

        Ok(Self::Select { table, filter })
    }
}

fn expected(what: &str, found: Option<&Token>) -> Error {
    match found {
        Some(token) => syntax_error(format!("expected {what}, found {token}")),
        None => syntax_error(format!("expected {what}")),
    }
}

fn identifier(ident: &sql_ast::Ident) -> String {
    ident.value.to_ascii_lowercase()
}

fn table_name(name: &sql_ast::ObjectName) -> Result<String> {
    name.0
        .last()
        .map(|part| part.to_string().to_ascii_lowercase())
        .ok_or_else(|| syntax_error("missing table name"))
}

/// Converts a literal, a negated number or a `$name` placeholder.
fn value(expr: sql_ast::Expr) -> Result<Expr> {
    match expr {
        sql_ast::Expr::Value(literal) => match literal.value {
            sql_ast::Value::Null => Ok(Expr::Null),
            sql_ast::Value::Boolean(b) => Ok(Expr::Bool(b)),
            sql_ast::Value::SingleQuotedString(s) => Ok(Expr::Text(s)),
            sql_ast::Value::Number(n, _) => match n.parse() {
                Ok(int) => Ok(Expr::Int(int)),
                Err(_) => n
                    .parse()
                    .map(Expr::Float)
                    .map_err(|_| syntax_error(format!("invalid number '{n}'"))),
            },
            sql_ast::Value::Placeholder(p) => match p.strip_prefix('$') {
                Some(name) if !name.is_empty() => Ok(Expr::Param(name.to_owned())),
                _ => Err(unsupported(format!("placeholder '{p}'"))),
            },
            other => Err(unsupported(format!("value '{other}'"))),
        },
        sql_ast::Expr::UnaryOp {
            op: sql_ast::UnaryOperator::Minus,
            expr,
        } => match value(*expr)? {
            Expr::Int(i) => Ok(Expr::Int(-i)),
            Expr::Float(f) => Ok(Expr::Float(-f)),
            _ => Err(unsupported("negation of a non-number")),
        },
        other => Err(unsupported(format!("expression '{other}'"))),
    }
}
