//! Pull-based parameter lookup.

use std::collections::HashMap;

use crate::value::Value;

/// Name → value lookup consulted by drivers while executing content.
///
/// Implementations compose by delegation: a scope answers the names it owns
/// and forwards everything else to its parent.
pub trait ParametersCallback {
    /// Returns the value of the named parameter, or `None` if it is unknown.
    fn parameter(&self, name: &str) -> Option<Value>;
}

impl<T: ParametersCallback + ?Sized> ParametersCallback for &T {
    fn parameter(&self, name: &str) -> Option<Value> {
        (**self).parameter(name)
    }
}

/// A fixed set of named parameters.
///
/// The set is read any number of times, so it holds plain values only. A
/// [`Value::Stream`] is read to the end when inserted and kept as
/// [`Value::Bytes`]; a stream that fails to read is kept as [`Value::Null`].
#[derive(Debug, Default)]
pub struct Parameters {
    values: HashMap<String, Value>,
}

impl Parameters {
    /// Creates an empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a parameter, replacing any previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let value = match value.into() {
            Value::Stream(stream) => stream
                .read_all()
                .map_or(Value::Null, |bytes| Value::Bytes(bytes.into())),
            value => value,
        };
        self.values.insert(name.into(), value);
    }

    /// Sets a parameter and returns the set.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Returns true if the parameter is present.
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Returns the number of parameters.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if there are no parameters.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl ParametersCallback for Parameters {
    fn parameter(&self, name: &str) -> Option<Value> {
        self.values.get(name).and_then(Value::try_clone)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Parameters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut parameters = Self::new();
        for (name, value) in iter {
            parameters.insert(name, value);
        }
        parameters
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Read};

    use bytes::Bytes;

    use super::*;
    use crate::value::ValueStream;

    #[test]
    fn lookup_returns_copies() {
        let parameters = Parameters::new().with("name", "value").with("count", 3);
        assert_eq!(parameters.parameter("name"), Some(Value::from("value")));
        assert_eq!(parameters.parameter("count"), Some(Value::Int(3)));
        assert_eq!(parameters.parameter("missing"), None);
        assert_eq!(parameters.len(), 2);
    }

    #[test]
    fn streams_are_kept_as_bytes() {
        let stream = ValueStream::new(Cursor::new(b"payload".to_vec()));
        let parameters = Parameters::new().with("blob", Value::Stream(stream));

        let expected = Value::Bytes(Bytes::from_static(b"payload"));
        assert_eq!(parameters.parameter("blob"), Some(expected));
        assert!(parameters.parameter("blob").is_some_and(|v| !v.is_stream()));
    }

    #[test]
    fn unreadable_streams_are_kept_as_null() {
        struct Broken;

        impl Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::other("device gone"))
            }
        }

        let parameters = Parameters::new().with("blob", Value::Stream(ValueStream::new(Broken)));
        assert_eq!(parameters.parameter("blob"), Some(Value::Null));
    }

    #[test]
    fn collects_from_pairs() {
        let parameters: Parameters = [("a", "1"), ("b", "2")].into_iter().collect();
        assert!(parameters.contains("a"));
        assert!(parameters.contains("b"));
    }
}
