//! Value kinds and hierarchical path addressing over [`serde_json::Value`].
//!
//! Property values are stored as a single JSON object tree. A property path
//! such as `"pose/position"` addresses a nested key and is normalized to the
//! JSON pointer `"/pose/position"` before use.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The declared type of a property.
///
/// `Discarded` declares an untyped entry that accepts any value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// JSON `null`.
    Null,
    /// JSON boolean.
    Boolean,
    /// JSON string.
    String,
    /// Signed integer (negative numbers).
    Integer,
    /// Unsigned integer (non-negative numbers).
    Unsigned,
    /// Floating point number.
    Float,
    /// JSON object (record).
    Object,
    /// JSON array.
    Array,
    /// Untyped entry.
    Discarded,
}

impl ValueKind {
    /// Returns the kind of a concrete value.
    ///
    /// Non-negative integers are reported as [`ValueKind::Unsigned`], the
    /// way `serde_json` stores them.
    #[must_use]
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Boolean,
            Value::String(_) => ValueKind::String,
            Value::Number(n) if n.is_u64() => ValueKind::Unsigned,
            Value::Number(n) if n.is_i64() => ValueKind::Integer,
            Value::Number(_) => ValueKind::Float,
            Value::Object(_) => ValueKind::Object,
            Value::Array(_) => ValueKind::Array,
        }
    }

    /// Checks whether `value` may be stored under a property of this kind.
    #[must_use]
    pub fn matches(self, value: &Value) -> bool {
        let found = ValueKind::of(value);
        match (self, found) {
            (declared, found) if declared == found => true,
            (ValueKind::Discarded, _) => true,
            (ValueKind::Integer, ValueKind::Unsigned) => true,
            (ValueKind::Unsigned, ValueKind::Integer) => value.as_i64().is_some_and(|v| v >= 0),
            // lazy initialization of nested records
            (ValueKind::Object, ValueKind::Null) => true,
            _ => false,
        }
    }

    /// Returns the display name used in error messages.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ValueKind::Null => "null",
            ValueKind::Boolean => "boolean",
            ValueKind::String => "string",
            ValueKind::Integer => "int",
            ValueKind::Unsigned => "unsigned int",
            ValueKind::Float => "float",
            ValueKind::Object => "object",
            ValueKind::Array => "array",
            ValueKind::Discarded => "discarded",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalizes a hierarchical key into a JSON pointer.
///
/// `"a/b"` and `"/a/b"` both become `"/a/b"`. The empty path stays empty
/// and addresses the root.
#[must_use]
pub fn to_pointer(path: &str) -> String {
    if path.is_empty() || path.starts_with('/') {
        path.to_owned()
    } else {
        format!("/{path}")
    }
}

/// Returns the value stored at `pointer`, if any.
#[must_use]
pub fn get_at<'a>(root: &'a Value, pointer: &str) -> Option<&'a Value> {
    root.pointer(pointer)
}

/// Stores `value` at `pointer`, creating intermediate objects on the way.
///
/// Intermediate non-object values are replaced by objects.
pub fn set_at(root: &mut Value, pointer: &str, value: Value) {
    if pointer.is_empty() {
        *root = value;
        return;
    }
    let mut current = root;
    let mut tokens = pointer
        .strip_prefix('/')
        .unwrap_or(pointer)
        .split('/')
        .map(|t| t.replace("~1", "/").replace("~0", "~"))
        .peekable();
    while let Some(token) = tokens.next() {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let Value::Object(map) = current else {
            return;
        };
        if tokens.peek().is_none() {
            map.insert(token, value);
            return;
        }
        current = map.entry(token).or_insert_with(|| Value::Object(Map::new()));
    }
}
