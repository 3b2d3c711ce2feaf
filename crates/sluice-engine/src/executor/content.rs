//! Dialect-aware content resolution.

use std::path::Path;
use std::sync::OnceLock;

use regex::{Regex, RegexBuilder};
use sluice_core::{DialectIdentifier, Error, Resource, Result};

use crate::config::{Content, ContentPart, DialectDecl};
use crate::location::Location;

/// Name and version patterns a dialect must match.
#[derive(Debug, Clone)]
struct DialectGuard {
    name: Option<Regex>,
    version: Option<Regex>,
    exclude: bool,
}

impl DialectGuard {
    fn new(decl: &DialectDecl) -> Result<Self> {
        Ok(Self {
            name: decl.name.as_deref().map(pattern).transpose()?,
            version: decl.version.as_deref().map(pattern).transpose()?,
            exclude: decl.exclude,
        })
    }

    fn matches(&self, dialect: &DialectIdentifier) -> bool {
        let name = self.name.as_ref().is_none_or(|re| re.is_match(&dialect.name));
        let version = self
            .version
            .as_ref()
            .is_none_or(|re| re.is_match(dialect.version_str()));
        (name && version) != self.exclude
    }
}

/// Compiles a case-insensitive pattern that must match the whole input.
fn pattern(source: &str) -> Result<Regex> {
    RegexBuilder::new(&format!("^(?:{source})$"))
        .case_insensitive(true)
        .build()
        .map_err(|e| {
            Error::configuration()
                .with_message(format!("invalid dialect pattern '{source}': {e}"))
                .with_source(e)
        })
}

#[derive(Debug)]
struct Segment {
    guards: Vec<DialectGuard>,
    text: String,
}

/// Element content with includes read and dialect guards compiled.
///
/// The text selected for a dialect is cached for the life of the element.
#[derive(Debug)]
pub(crate) struct ContentResolver {
    segments: Vec<Segment>,
    origin: String,
    cache: OnceLock<(DialectIdentifier, Resource)>,
}

impl ContentResolver {
    /// Prepares `content`, reading includes relative to `base_dir`.
    pub(crate) fn new(content: &Content, base_dir: Option<&Path>, location: &Location) -> Result<Self> {
        let mut segments = Vec::new();
        collect(content, &[], base_dir, &mut segments).map_err(|e| e.with_location(location))?;
        Ok(Self {
            segments,
            origin: location.to_string(),
            cache: OnceLock::new(),
        })
    }

    /// Returns the content selected for `dialect`.
    pub(crate) fn resolve(&self, dialect: &DialectIdentifier) -> Resource {
        match self.cache.get() {
            Some((cached, resource)) if cached == dialect => return resource.clone(),
            Some(_) => return self.assemble(dialect),
            None => {}
        }
        self.cache
            .get_or_init(|| (dialect.clone(), self.assemble(dialect)))
            .1
            .clone()
    }

    fn assemble(&self, dialect: &DialectIdentifier) -> Resource {
        let text = self
            .segments
            .iter()
            .filter(|segment| segment.guards.iter().all(|guard| guard.matches(dialect)))
            .map(|segment| segment.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        Resource::new(text).with_origin(self.origin.as_str())
    }
}

fn collect(
    content: &Content,
    guards: &[DialectGuard],
    base_dir: Option<&Path>,
    segments: &mut Vec<Segment>,
) -> Result<()> {
    let parts = match content {
        Content::Text(text) => {
            segments.push(Segment {
                guards: guards.to_vec(),
                text: text.clone(),
            });
            return Ok(());
        }
        Content::Parts(parts) => parts,
    };

    for part in parts {
        match part {
            ContentPart::Text(text) => segments.push(Segment {
                guards: guards.to_vec(),
                text: text.clone(),
            }),
            ContentPart::Include(path) => {
                let path = match base_dir {
                    Some(base) if path.is_relative() => base.join(path),
                    _ => path.clone(),
                };
                let text = std::fs::read_to_string(&path).map_err(|e| {
                    Error::configuration()
                        .with_message(format!("cannot read include '{}'", path.display()))
                        .with_source(e)
                })?;
                segments.push(Segment {
                    guards: guards.to_vec(),
                    text,
                });
            }
            ContentPart::Dialect(decl) => {
                let mut nested = guards.to_vec();
                nested.push(DialectGuard::new(decl)?);
                collect(&decl.content, &nested, base_dir, segments)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dialect_part(name: &str, version: Option<&str>, exclude: bool, text: &str) -> ContentPart {
        ContentPart::Dialect(DialectDecl {
            name: Some(name.to_owned()),
            version: version.map(str::to_owned),
            exclude,
            content: Content::Text(text.to_owned()),
        })
    }

    fn location() -> Location {
        Location::root().child("script", 1)
    }

    #[test]
    fn selects_parts_for_the_dialect() {
        let content = Content::Parts(vec![
            ContentPart::Text("common".into()),
            dialect_part("oracle", None, false, "oracle only"),
            dialect_part("MEMORY", Some("1\\..*"), false, "memory 1.x"),
            dialect_part("memory", None, true, "not memory"),
        ]);
        let resolver = ContentResolver::new(&content, None, &location()).unwrap();

        let memory = DialectIdentifier::new("memory").with_version("1.0");
        let resource = resolver.resolve(&memory);
        assert_eq!(resource.text(), "common\nmemory 1.x");
        assert_eq!(resource.origin(), Some("/etl[1]/script[1]"));

        let other = DialectIdentifier::new("h2");
        assert_eq!(resolver.resolve(&other).text(), "common\nnot memory");
        assert_eq!(resolver.resolve(&memory).text(), "common\nmemory 1.x");
    }

    #[test]
    fn includes_resolve_relative_to_base_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("body.sql"), "INSERT INTO t VALUES (1);").unwrap();
        let content = Content::Parts(vec![ContentPart::Include("body.sql".into())]);

        let resolver = ContentResolver::new(&content, Some(dir.path()), &location()).unwrap();
        let resource = resolver.resolve(&DialectIdentifier::new("memory"));
        assert_eq!(resource.text(), "INSERT INTO t VALUES (1);");
    }

    #[test]
    fn unreadable_includes_and_bad_patterns_are_configuration_errors() {
        let missing = Content::Parts(vec![ContentPart::Include("/nonexistent/body.sql".into())]);
        let error = ContentResolver::new(&missing, None, &location()).unwrap_err();
        assert_eq!(error.kind(), sluice_core::ErrorKind::Configuration);
        assert_eq!(error.location.as_deref(), Some("/etl[1]/script[1]"));

        let invalid = Content::Parts(vec![dialect_part("(", None, false, "x")]);
        assert!(ContentResolver::new(&invalid, None, &location()).is_err());
    }
}
