//! Property schemas: declared type, allowed values and default per path.
//!
//! A [`PropertySchema`] is used twice: as the property schema of an
//! [`Entity`](crate::Entity) and as the edge-property template of a
//! [`Relation`](crate::Relation).

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

use crate::error::{Result, XTypeError};
use crate::value::{get_at, set_at, to_pointer, ValueKind};

/// One schema entry.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDef {
    /// Declared type.
    pub kind: ValueKind,
    /// Allowed values; empty means unconstrained.
    pub allowed: Vec<Value>,
    /// Initial value.
    pub default: Value,
}

impl PropertyDef {
    /// Checks `value` against the allowed-value set.
    #[must_use]
    pub fn is_allowed_value(&self, value: &Value) -> bool {
        self.allowed.is_empty() || self.allowed.contains(value)
    }
}

/// Mapping from normalized property path to its [`PropertyDef`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertySchema {
    entries: BTreeMap<String, PropertyDef>,
}

impl PropertySchema {
    /// Creates an empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`define`](Self::define) for static templates.
    ///
    /// # Errors
    ///
    /// Same as [`define`](Self::define).
    pub fn with(
        mut self,
        path: &str,
        kind: ValueKind,
        allowed: Vec<Value>,
        default: Value,
    ) -> Result<Self> {
        self.define(path, kind, allowed, default, false)?;
        Ok(self)
    }

    /// Registers a schema entry at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`XTypeError::PropertyAlreadyDefined`] if `path` is defined
    /// and `override_existing` is false, or [`XTypeError::InvalidDefault`]
    /// if `default` does not match `kind` or `allowed`.
    pub fn define(
        &mut self,
        path: &str,
        kind: ValueKind,
        allowed: Vec<Value>,
        default: Value,
        override_existing: bool,
    ) -> Result<()> {
        let pointer = to_pointer(path);
        if self.entries.contains_key(&pointer) && !override_existing {
            return Err(XTypeError::PropertyAlreadyDefined {
                classname: String::new(),
                path: pointer,
            });
        }
        let mut allowed_set: Vec<Value> = Vec::with_capacity(allowed.len());
        for value in allowed {
            if !allowed_set.contains(&value) {
                allowed_set.push(value);
            }
        }
        let def = PropertyDef {
            kind,
            allowed: allowed_set,
            default,
        };
        if !kind.matches(&def.default) || !def.is_allowed_value(&def.default) {
            return Err(XTypeError::InvalidDefault {
                path: pointer,
                value: def.default.to_string(),
            });
        }
        self.entries.insert(pointer, def);
        Ok(())
    }

    /// Checks whether `path` has a schema entry.
    #[must_use]
    pub fn has_property(&self, path: &str) -> bool {
        self.entries.contains_key(&to_pointer(path))
    }

    /// Returns the schema entry for `path`.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&PropertyDef> {
        self.entries.get(&to_pointer(path))
    }

    /// Returns the declared type of `path`.
    #[must_use]
    pub fn property_kind(&self, path: &str) -> Option<ValueKind> {
        self.get(path).map(|def| def.kind)
    }

    /// Returns the allowed-value set of `path`.
    #[must_use]
    pub fn allowed_values(&self, path: &str) -> Option<&[Value]> {
        self.get(path).map(|def| def.allowed.as_slice())
    }

    /// Checks whether `value` matches the declared type of `path`.
    ///
    /// Returns `None` if `path` is not defined.
    #[must_use]
    pub fn is_type_matching(&self, path: &str, value: &Value) -> Option<bool> {
        self.get(path).map(|def| def.kind.matches(value))
    }

    /// Checks whether `value` is in the allowed-value set of `path`.
    ///
    /// Returns `None` if `path` is not defined.
    #[must_use]
    pub fn is_allowed_value(&self, path: &str, value: &Value) -> Option<bool> {
        self.get(path).map(|def| def.is_allowed_value(value))
    }

    /// Iterates over all defined paths in lexical order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Iterates over `(path, entry)` pairs in path order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &PropertyDef)> {
        self.entries.iter().map(|(path, def)| (path.as_str(), def))
    }

    /// Returns `true` if no entry is defined.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Builds the value tree holding every default.
    #[must_use]
    pub fn defaults(&self) -> Value {
        let mut root = Value::Object(Map::new());
        for (pointer, def) in &self.entries {
            set_at(&mut root, pointer, def.default.clone());
        }
        root
    }

    /// Merges `bag` onto the defaults.
    ///
    /// Only paths defined in this schema are taken from `bag`; every other
    /// key is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`XTypeError::TypeMismatch`] or [`XTypeError::ValueNotAllowed`]
    /// if a value taken from `bag` violates its entry.
    pub fn merge(&self, bag: &Value) -> Result<Value> {
        let mut merged = self.defaults();
        for (pointer, def) in &self.entries {
            let Some(value) = get_at(bag, pointer) else {
                continue;
            };
            if !def.kind.matches(value) {
                return Err(XTypeError::TypeMismatch {
                    classname: String::new(),
                    path: pointer.clone(),
                    expected: def.kind,
                    found: ValueKind::of(value),
                });
            }
            if !def.is_allowed_value(value) {
                return Err(XTypeError::ValueNotAllowed {
                    classname: String::new(),
                    path: pointer.clone(),
                    value: value.to_string(),
                });
            }
            set_at(&mut merged, pointer, value.clone());
        }
        Ok(merged)
    }

    /// Describes the schema as JSON.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut types = Map::new();
        let mut allowed = Map::new();
        let mut defaults = Map::new();
        for (pointer, def) in &self.entries {
            types.insert(pointer.clone(), json!(def.kind));
            allowed.insert(pointer.clone(), Value::Array(def.allowed.clone()));
            defaults.insert(pointer.clone(), def.default.clone());
        }
        json!({
            "property_types": types,
            "allowed_values": allowed,
            "default_values": defaults
        })
    }
}
