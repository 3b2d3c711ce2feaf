//! Element locations.

use std::collections::HashMap;

use derive_more::Display;

/// Position of an element in the configuration document.
///
/// Locations look like `/etl[1]/query[1]/script[2]`: every step names the
/// element tag and its 1-based index among siblings with the same tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
#[display("{_0}")]
pub struct Location(String);

impl Location {
    /// Returns the location of the document root.
    pub fn root() -> Self {
        Self("/etl[1]".to_owned())
    }

    /// Returns the location of a child element.
    pub fn child(&self, tag: &str, index: usize) -> Self {
        Self(format!("{}/{tag}[{index}]", self.0))
    }

    /// Returns the location as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Hands out per-tag sibling indexes.
#[derive(Debug, Default)]
pub(crate) struct SiblingIndex(HashMap<&'static str, usize>);

impl SiblingIndex {
    pub(crate) fn next(&mut self, tag: &'static str) -> usize {
        let index = self.0.entry(tag).or_default();
        *index += 1;
        *index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn siblings_are_indexed_per_tag() {
        let root = Location::root();
        let mut siblings = SiblingIndex::default();
        let script = root.child("script", siblings.next("script"));
        let query = root.child("query", siblings.next("query"));
        let second = query.child("script", 2);

        assert_eq!(script.as_str(), "/etl[1]/script[1]");
        assert_eq!(query.to_string(), "/etl[1]/query[1]");
        assert_eq!(second.as_str(), "/etl[1]/query[1]/script[2]");
        assert_eq!(siblings.next("script"), 2);
    }
}
