//! Facts: relation instances pointing at a target entity.

use serde_json::Value;

use crate::registry::EntityId;

/// One edge of a relation.
///
/// A fact is *resolved* when it holds a live handle and *deferred* when only
/// the target identifier is known. The identifier is cached alongside the
/// handle so the fact survives identifier changes and can be compared
/// without dereferencing.
#[derive(Debug, Clone, PartialEq)]
pub struct Fact {
    /// Live handle of the target, if materialized.
    pub target: Option<EntityId>,
    /// Last known identifier of the target.
    pub target_uri: Option<String>,
    /// Edge properties, merged onto the relation's template.
    pub edge_properties: Value,
}

impl Fact {
    /// Creates a fact holding a live handle.
    #[must_use]
    pub fn resolved(target: EntityId, target_uri: Option<String>, edge_properties: Value) -> Self {
        Self {
            target: Some(target),
            target_uri,
            edge_properties,
        }
    }

    /// Creates a fact known only by the target identifier.
    #[must_use]
    pub fn deferred(target_uri: impl Into<String>, edge_properties: Value) -> Self {
        Self {
            target: None,
            target_uri: Some(target_uri.into()),
            edge_properties,
        }
    }

    /// Returns the cached target identifier.
    #[must_use]
    pub fn uri(&self) -> Option<&str> {
        self.target_uri.as_deref()
    }

    /// Checks whether this fact and the target described by `target` /
    /// `target_uri` refer to the same entity.
    ///
    /// Two live handles are compared by identity only; identifiers decide
    /// when either side is deferred. Edge properties are not compared; a
    /// relation holds at most one fact per target.
    #[must_use]
    pub fn refers_to(&self, target: Option<EntityId>, target_uri: Option<&str>) -> bool {
        match (self.target, target) {
            (Some(mine), Some(theirs)) => mine == theirs,
            _ => matches!((self.uri(), target_uri), (Some(a), Some(b)) if a == b),
        }
    }

    /// Checks whether two facts point at the same target.
    #[must_use]
    pub fn same_target(&self, other: &Fact) -> bool {
        self.refers_to(other.target, other.uri())
    }

    /// Updates the cached identifier.
    ///
    /// An empty identifier is ignored. The live handle is dropped when
    /// `current` (the identifier the handle currently resolves to) no longer
    /// matches.
    pub fn set_uri(&mut self, uri: &str, current: Option<&str>) {
        if uri.is_empty() {
            return;
        }
        self.target_uri = Some(uri.to_owned());
        if self.target.is_some() && current != Some(uri) {
            self.target = None;
        }
    }

    /// Upserts `edge_properties` into this fact, key by key.
    pub fn upsert_properties(&mut self, edge_properties: &Value) {
        match (&mut self.edge_properties, edge_properties) {
            (Value::Object(existing), Value::Object(update)) => {
                for (key, value) in update {
                    existing.insert(key.clone(), value.clone());
                }
            }
            (existing, update) => *existing = update.clone(),
        }
    }
}
