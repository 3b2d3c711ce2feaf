//! Parameter values exchanged between the engine and drivers.

use std::fmt;
use std::io::Read;

use bytes::Bytes;
use derive_more::From;

/// A value returned by a parameter lookup.
///
/// Most variants are plain data and can be copied freely. [`Value::Stream`]
/// wraps a reader that can be consumed only once, so it is never cached.
#[derive(Debug, From)]
pub enum Value {
    /// Absent or SQL `NULL` value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer value.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// Text value.
    Text(String),
    /// Binary value.
    Bytes(Bytes),
    /// Single-use stream (LOBs, file contents).
    Stream(ValueStream),
}

impl Value {
    /// Returns a copy of the value, or `None` for streams.
    pub fn try_clone(&self) -> Option<Self> {
        Some(match self {
            Self::Null => Self::Null,
            Self::Bool(b) => Self::Bool(*b),
            Self::Int(i) => Self::Int(*i),
            Self::Float(f) => Self::Float(*f),
            Self::Text(s) => Self::Text(s.clone()),
            Self::Bytes(b) => Self::Bytes(b.clone()),
            Self::Stream(_) => return None,
        })
    }

    /// Returns true for single-use stream values.
    pub fn is_stream(&self) -> bool {
        matches!(self, Self::Stream(_))
    }

    /// Returns true for null values.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the value as a number, parsing text when possible.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Returns the value as an integer, if it is integral.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Returns the text content, if this is a text value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Interprets the value as a condition.
    ///
    /// Null, `false`, zero, empty text, the text `"false"` and empty binaries
    /// are falsy; everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::Text(s) => !s.is_empty() && !s.eq_ignore_ascii_case("false"),
            Self::Bytes(b) => !b.is_empty(),
            Self::Stream(_) => true,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
            Self::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Self::Stream(_) => f.write_str("<stream>"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Int(a), Self::Float(b)) | (Self::Float(b), Self::Int(a)) => (*a as f64) == *b,
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            _ => false,
        }
    }
}

/// A readable stream that can be consumed exactly once.
pub struct ValueStream(Box<dyn Read + Send>);

impl ValueStream {
    /// Wraps a reader.
    pub fn new(reader: impl Read + Send + 'static) -> Self {
        Self(Box::new(reader))
    }

    /// Reads the remaining content into a byte vector.
    pub fn read_all(mut self) -> std::io::Result<Vec<u8>> {
        let mut buffer = Vec::new();
        self.0.read_to_end(&mut buffer)?;
        Ok(buffer)
    }
}

impl fmt::Debug for ValueStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ValueStream")
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn streams_cannot_be_cloned() {
        let stream = Value::Stream(ValueStream::new(Cursor::new(b"abc".to_vec())));
        assert!(stream.is_stream());
        assert!(stream.try_clone().is_none());

        let text = Value::from("abc");
        assert_eq!(text.try_clone(), Some(Value::from("abc")));
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::from("false").is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(Value::from("yes").is_truthy());
        assert!(Value::Float(0.5).is_truthy());
    }

    #[test]
    fn numeric_coercion() {
        assert_eq!(Value::from("42").as_i64(), Some(42));
        assert_eq!(Value::from(" 1.5 ").as_f64(), Some(1.5));
        assert_eq!(Value::Int(3), Value::Float(3.0));
        assert_eq!(Value::from(Option::<i64>::None), Value::Null);
    }

    #[test]
    fn stream_reads_once() {
        let stream = ValueStream::new(Cursor::new(b"payload".to_vec()));
        assert_eq!(stream.read_all().unwrap(), b"payload");
    }
}
