//! Conditional expressions used by `if` attributes.
//!
//! The language is small: parameter names, string/number/boolean/`null`
//! literals, comparisons (`== != < <= > >=`, also `= eq ne`), boolean
//! operators (`&& || !`, also `and or not`) and parentheses. Parsing happens
//! once when the configuration is loaded; evaluation never fails, missing
//! parameters are `null` and therefore false.

use std::cmp::Ordering;
use std::fmt;

use sluice_core::{Error, ParametersCallback, Result, Value};

/// A parsed conditional expression.
#[derive(Debug, Clone)]
pub struct Expression {
    source: String,
    root: Node,
}

impl Expression {
    /// Parses an expression.
    pub fn parse(source: &str) -> Result<Self> {
        let tokens = tokenize(source).map_err(|message| invalid(source, message))?;
        let mut parser = Parser {
            tokens,
            position: 0,
        };
        let root = parser.or().map_err(|message| invalid(source, message))?;
        if let Some(token) = parser.peek() {
            return Err(invalid(source, format!("unexpected {token}")));
        }
        Ok(Self {
            source: source.to_owned(),
            root,
        })
    }

    /// Evaluates the expression against `parameters` as a condition.
    pub fn evaluate(&self, parameters: &dyn ParametersCallback) -> bool {
        self.root.eval(parameters).is_truthy()
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn invalid(source: &str, message: impl fmt::Display) -> Error {
    Error::configuration().with_message(format!("invalid expression '{source}': {message}"))
}

#[derive(Debug, Clone, PartialEq)]
enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Literal {
    fn value(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::Int(*i),
            Self::Float(f) => Value::Float(*f),
            Self::Text(s) => Value::Text(s.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone)]
enum Node {
    Literal(Literal),
    Parameter(String),
    Not(Box<Node>),
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
    Compare(Comparison, Box<Node>, Box<Node>),
}

impl Node {
    fn eval(&self, parameters: &dyn ParametersCallback) -> Value {
        match self {
            Self::Literal(literal) => literal.value(),
            Self::Parameter(name) => parameters.parameter(name).unwrap_or(Value::Null),
            Self::Not(inner) => Value::Bool(!inner.eval(parameters).is_truthy()),
            Self::And(left, right) => Value::Bool(
                left.eval(parameters).is_truthy() && right.eval(parameters).is_truthy(),
            ),
            Self::Or(left, right) => Value::Bool(
                left.eval(parameters).is_truthy() || right.eval(parameters).is_truthy(),
            ),
            Self::Compare(op, left, right) => {
                Value::Bool(compare(*op, &left.eval(parameters), &right.eval(parameters)))
            }
        }
    }
}

fn compare(op: Comparison, left: &Value, right: &Value) -> bool {
    if left.is_null() || right.is_null() {
        let both = left.is_null() && right.is_null();
        return match op {
            Comparison::Eq => both,
            Comparison::Ne => !both,
            _ => false,
        };
    }

    let ordering = match (left.as_f64(), right.as_f64()) {
        (Some(l), Some(r)) => l.partial_cmp(&r),
        _ => Some(left.to_string().cmp(&right.to_string())),
    };
    let Some(ordering) = ordering else {
        return op == Comparison::Ne;
    };
    match op {
        Comparison::Eq => ordering == Ordering::Equal,
        Comparison::Ne => ordering != Ordering::Equal,
        Comparison::Lt => ordering == Ordering::Less,
        Comparison::Le => ordering != Ordering::Greater,
        Comparison::Gt => ordering == Ordering::Greater,
        Comparison::Ge => ordering != Ordering::Less,
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Literal(Literal),
    Compare(Comparison),
    And,
    Or,
    Not,
    Open,
    Close,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ident(name) => write!(f, "identifier '{name}'"),
            Self::Literal(literal) => write!(f, "literal {literal:?}"),
            Self::Compare(op) => write!(f, "operator {op:?}"),
            Self::And => f.write_str("'&&'"),
            Self::Or => f.write_str("'||'"),
            Self::Not => f.write_str("'!'"),
            Self::Open => f.write_str("'('"),
            Self::Close => f.write_str("')'"),
        }
    }
}

fn tokenize(source: &str) -> std::result::Result<Vec<Token>, String> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        let next = chars.get(i + 1).copied();
        match ch {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::Open);
                i += 1;
            }
            ')' => {
                tokens.push(Token::Close);
                i += 1;
            }
            '&' if next == Some('&') => {
                tokens.push(Token::And);
                i += 2;
            }
            '|' if next == Some('|') => {
                tokens.push(Token::Or);
                i += 2;
            }
            '!' if next == Some('=') => {
                tokens.push(Token::Compare(Comparison::Ne));
                i += 2;
            }
            '!' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '=' => {
                tokens.push(Token::Compare(Comparison::Eq));
                i += if next == Some('=') { 2 } else { 1 };
            }
            '<' | '>' => {
                let or_equal = next == Some('=');
                let op = match (ch, or_equal) {
                    ('<', false) => Comparison::Lt,
                    ('<', true) => Comparison::Le,
                    ('>', false) => Comparison::Gt,
                    _ => Comparison::Ge,
                };
                tokens.push(Token::Compare(op));
                i += if or_equal { 2 } else { 1 };
            }
            '\'' | '"' => {
                let quote = ch;
                let start = i + 1;
                let end = chars[start..]
                    .iter()
                    .position(|&c| c == quote)
                    .map(|offset| start + offset)
                    .ok_or_else(|| "unterminated string literal".to_owned())?;
                tokens.push(Token::Literal(Literal::Text(
                    chars[start..end].iter().collect(),
                )));
                i = end + 1;
            }
            c if c.is_ascii_digit() || (c == '-' && next.is_some_and(|n| n.is_ascii_digit())) => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let literal = match text.parse() {
                    Ok(int) => Literal::Int(int),
                    Err(_) => Literal::Float(
                        text.parse()
                            .map_err(|_| format!("invalid number '{text}'"))?,
                    ),
                };
                tokens.push(Token::Literal(literal));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.')
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.to_ascii_lowercase().as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "eq" => Token::Compare(Comparison::Eq),
                    "ne" => Token::Compare(Comparison::Ne),
                    "true" => Token::Literal(Literal::Bool(true)),
                    "false" => Token::Literal(Literal::Bool(false)),
                    "null" => Token::Literal(Literal::Null),
                    _ => Token::Ident(word),
                });
            }
            other => return Err(format!("unexpected character '{other}'")),
        }
    }

    Ok(tokens)
}

type ParseResult = std::result::Result<Node, String>;

struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        self.position += 1;
        token
    }

    fn or(&mut self) -> ParseResult {
        let mut left = self.and()?;
        while self.peek() == Some(&Token::Or) {
            self.position += 1;
            left = Node::Or(Box::new(left), Box::new(self.and()?));
        }
        Ok(left)
    }

    fn and(&mut self) -> ParseResult {
        let mut left = self.not()?;
        while self.peek() == Some(&Token::And) {
            self.position += 1;
            left = Node::And(Box::new(left), Box::new(self.not()?));
        }
        Ok(left)
    }

    fn not(&mut self) -> ParseResult {
        if self.peek() == Some(&Token::Not) {
            self.position += 1;
            return Ok(Node::Not(Box::new(self.not()?)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> ParseResult {
        let left = self.primary()?;
        if let Some(Token::Compare(op)) = self.peek() {
            let op = *op;
            self.position += 1;
            return Ok(Node::Compare(op, Box::new(left), Box::new(self.primary()?)));
        }
        Ok(left)
    }

    fn primary(&mut self) -> ParseResult {
        match self.advance() {
            Some(Token::Literal(literal)) => Ok(Node::Literal(literal)),
            Some(Token::Ident(name)) => Ok(Node::Parameter(name)),
            Some(Token::Open) => {
                let inner = self.or()?;
                match self.advance() {
                    Some(Token::Close) => Ok(inner),
                    Some(token) => Err(format!("expected ')', found {token}")),
                    None => Err("expected ')'".to_owned()),
                }
            }
            Some(token) => Err(format!("unexpected {token}")),
            None => Err("unexpected end of expression".to_owned()),
        }
    }
}
