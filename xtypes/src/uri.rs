//! Identifier derivation and fingerprints.
//!
//! An entity's identifier ("URI") is rendered from a per-class
//! [`UriTemplate`]. It is invalid (`None`) while a required part cannot be
//! computed yet. The fingerprint ("uuid") is the CRC-32 of the identifier
//! bytes, stable across platforms and interoperable with existing dumps.

use serde_json::Value;

use crate::entity::Entity;
use crate::value::{get_at, to_pointer};

/// Scheme of the base class identifier.
pub const DEFAULT_SCHEME: &str = "xtypes";

/// Root path of the base class identifier.
pub const DEFAULT_ROOT_PATH: &str = "generic";

/// One component of an identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UriPart {
    /// Value of a property.
    Property {
        /// Property path.
        path: String,
        /// Whether the identifier is invalid without this part.
        required: bool,
    },
    /// Identifier of the first fact of a relation.
    Relation {
        /// Relation attribute name.
        name: String,
        /// Whether the identifier is invalid without this part.
        required: bool,
    },
}

/// Recipe for rendering an entity identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriTemplate {
    /// Scheme, rendered before `://`.
    pub scheme: String,
    /// Leading path segment; skipped when empty.
    pub root_path: String,
    /// Ordered identifier parts.
    pub parts: Vec<UriPart>,
}

impl Default for UriTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_SCHEME, DEFAULT_ROOT_PATH)
    }
}

impl UriTemplate {
    /// Creates a template without parts.
    pub fn new(scheme: impl Into<String>, root_path: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            root_path: root_path.into(),
            parts: Vec::new(),
        }
    }

    /// Appends a property part.
    #[must_use]
    pub fn property(mut self, path: impl Into<String>, required: bool) -> Self {
        self.parts.push(UriPart::Property {
            path: to_pointer(&path.into()),
            required,
        });
        self
    }

    /// Appends a relation part.
    #[must_use]
    pub fn relation(mut self, name: impl Into<String>, required: bool) -> Self {
        self.parts.push(UriPart::Relation {
            name: name.into(),
            required,
        });
        self
    }

    /// Renders the identifier of `entity`, or `None` if a required part is
    /// missing.
    ///
    /// A relation part takes the cached identifier of the first fact.
    #[must_use]
    pub fn render(&self, entity: &Entity) -> Option<String> {
        let mut segments: Vec<String> = Vec::with_capacity(self.parts.len() + 1);
        let root = self.root_path.trim_matches('/');
        if !root.is_empty() {
            segments.push(root.to_owned());
        }
        for part in &self.parts {
            let (segment, required) = match part {
                UriPart::Property { path, required } => {
                    (get_at(entity.get_properties(), path).and_then(segment_of), *required)
                }
                UriPart::Relation { name, required } => (
                    entity
                        .cached_facts(name)
                        .and_then(|facts| facts.first())
                        .and_then(|fact| fact.uri())
                        .map(strip_scheme),
                    *required,
                ),
            };
            match segment {
                Some(segment) => segments.push(segment),
                None if required => return None,
                None => {}
            }
        }
        Some(format!("{}://{}", self.scheme, segments.join("/")))
    }
}

fn segment_of(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn strip_scheme(uri: &str) -> String {
    uri.split_once("://").map_or(uri, |(_, rest)| rest).to_owned()
}

/// Computes the fingerprint of an identifier.
#[must_use]
pub fn uri_to_uuid(uri: &str) -> u32 {
    crc32fast::hash(uri.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_standard_crc32() {
        // CRC-32/ISO-HDLC check value
        assert_eq!(uri_to_uuid("123456789"), 0xCBF4_3926);
        assert_eq!(uri_to_uuid(""), 0);
        assert_eq!(uri_to_uuid("xtypes://generic"), uri_to_uuid("xtypes://generic"));
    }

    #[test]
    fn scheme_stripping() {
        assert_eq!(strip_scheme("robots://arm/base"), "arm/base");
        assert_eq!(strip_scheme("plain"), "plain");
    }

    #[test]
    fn segments() {
        assert_eq!(segment_of(&Value::Null), None);
        assert_eq!(segment_of(&Value::String(String::new())), None);
        assert_eq!(segment_of(&serde_json::json!("arm")), Some("arm".into()));
        assert_eq!(segment_of(&serde_json::json!(3)), Some("3".into()));
    }
}
