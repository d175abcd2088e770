//! Entities: typed properties, relation definitions and fact storage.
//!
//! Everything in this module works on a single entity. Operations that need
//! to look at a neighbour (adding a fact with inverse mirroring, resolving
//! deferred facts) live on the [`Registry`](crate::Registry), which owns
//! every entity it creates.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{Result, XTypeError};
use crate::fact::Fact;
use crate::registry::{EntityId, RegistryId};
use crate::relation::{Cardinality, Relation, RelationKind};
use crate::schema::{PropertyDef, PropertySchema};
use crate::uri::{uri_to_uuid, UriTemplate};
use crate::value::{get_at, set_at, to_pointer, ValueKind};

/// Classname of the base entity class, registered in every registry.
pub const BASE_CLASSNAME: &str = "xtypes::XType";

static NULL: Value = Value::Null;

/// A schema-typed object with properties, relations and facts.
#[derive(Debug, Clone)]
pub struct Entity {
    classname: String,
    uri_template: UriTemplate,
    registry: Option<RegistryId>,
    schema: PropertySchema,
    properties: Value,
    relations: BTreeMap<String, Relation>,
    relation_dir_forward: BTreeMap<String, bool>,
    // absent key: facts unknown; empty vec: known to be empty
    facts: BTreeMap<String, Vec<Fact>>,
}

impl Entity {
    /// Creates an empty entity of class `classname`.
    pub fn new(classname: impl Into<String>) -> Self {
        Self {
            classname: classname.into(),
            uri_template: UriTemplate::default(),
            registry: None,
            schema: PropertySchema::new(),
            properties: Value::Object(Map::new()),
            relations: BTreeMap::new(),
            relation_dir_forward: BTreeMap::new(),
            facts: BTreeMap::new(),
        }
    }

    /// Creates an instance of the base class.
    #[must_use]
    pub fn base() -> Self {
        Self::new(BASE_CLASSNAME)
    }

    /// Sets the identifier template.
    #[must_use]
    pub fn with_uri_template(mut self, template: UriTemplate) -> Self {
        self.uri_template = template;
        self
    }

    /// Returns the classname.
    #[must_use]
    pub fn classname(&self) -> &str {
        &self.classname
    }

    /// Returns the identifier template.
    #[must_use]
    pub fn uri_template(&self) -> &UriTemplate {
        &self.uri_template
    }

    /// Returns the current identifier, or `None` while it cannot be computed.
    ///
    /// Relation-based parts use the cached identifiers of the facts, which
    /// lag behind a renamed neighbour until
    /// [`Registry::refresh_facts`](crate::Registry::refresh_facts) runs.
    #[must_use]
    pub fn uri(&self) -> Option<String> {
        self.uri_template.render(self)
    }

    /// Checks whether the identifier can currently be computed.
    #[must_use]
    pub fn is_uri_valid(&self) -> bool {
        self.uri().is_some()
    }

    /// Returns the fingerprint of the current identifier.
    #[must_use]
    pub fn uuid(&self) -> Option<u32> {
        self.uri().map(|uri| uri_to_uuid(&uri))
    }

    /// Returns the registry this entity is bound to.
    #[must_use]
    pub fn registry(&self) -> Option<RegistryId> {
        self.registry
    }

    pub(crate) fn set_registry_once(&mut self, registry: RegistryId) {
        if self.registry.is_none() {
            self.registry = Some(registry);
        }
    }

    pub(crate) fn overwrite_registry(&mut self, registry: RegistryId) {
        self.registry = Some(registry);
    }

    /// Copies the full state of `other` except the registry binding.
    pub(crate) fn copy_state_from(&mut self, other: &Entity) {
        self.classname.clone_from(&other.classname);
        self.uri_template.clone_from(&other.uri_template);
        self.schema.clone_from(&other.schema);
        self.properties.clone_from(&other.properties);
        self.relations.clone_from(&other.relations);
        self.relation_dir_forward.clone_from(&other.relation_dir_forward);
        self.facts.clone_from(&other.facts);
    }

    // Properties

    /// Defines a property and assigns its default value.
    ///
    /// # Errors
    ///
    /// Returns [`XTypeError::PropertyAlreadyDefined`] if the path exists and
    /// `override_existing` is false, or [`XTypeError::InvalidDefault`] if the
    /// default does not fit `kind` and `allowed`.
    pub fn define_property(
        &mut self,
        path: &str,
        kind: ValueKind,
        allowed: Vec<Value>,
        default: Value,
        override_existing: bool,
    ) -> Result<()> {
        self.schema
            .define(path, kind, allowed, default.clone(), override_existing)
            .map_err(|e| e.for_class(&self.classname))?;
        set_at(&mut self.properties, &to_pointer(path), default);
        Ok(())
    }

    /// Checks whether a property is defined.
    #[must_use]
    pub fn has_property(&self, path: &str) -> bool {
        self.schema.has_property(path)
    }

    /// Returns the property schema.
    #[must_use]
    pub fn schema(&self) -> &PropertySchema {
        &self.schema
    }

    /// Returns the declared type of a property.
    ///
    /// # Errors
    ///
    /// Returns [`XTypeError::UnknownProperty`] if the path is not defined.
    pub fn property_kind(&self, path: &str) -> Result<ValueKind> {
        self.schema
            .property_kind(path)
            .ok_or_else(|| self.unknown_property(path))
    }

    /// Returns the allowed values of a property; empty means unconstrained.
    ///
    /// # Errors
    ///
    /// Returns [`XTypeError::UnknownProperty`] if the path is not defined.
    pub fn allowed_property_values(&self, path: &str) -> Result<&[Value]> {
        self.schema
            .allowed_values(path)
            .ok_or_else(|| self.unknown_property(path))
    }

    /// Checks whether `value` matches the declared type of a property.
    ///
    /// # Errors
    ///
    /// Returns [`XTypeError::UnknownProperty`] if the path is not defined.
    pub fn is_type_matching(&self, path: &str, value: &Value) -> Result<bool> {
        self.schema
            .is_type_matching(path, value)
            .ok_or_else(|| self.unknown_property(path))
    }

    /// Checks whether `value` may be assigned to a property.
    ///
    /// # Errors
    ///
    /// Returns [`XTypeError::UnknownProperty`] if the path is not defined.
    pub fn is_allowed_value(&self, path: &str, value: &Value) -> Result<bool> {
        self.schema
            .is_allowed_value(path, value)
            .ok_or_else(|| self.unknown_property(path))
    }

    /// Returns the current value of a property.
    ///
    /// # Errors
    ///
    /// Returns [`XTypeError::UnknownProperty`] if the path is not defined.
    pub fn get_property(&self, path: &str) -> Result<&Value> {
        if !self.schema.has_property(path) {
            return Err(self.unknown_property(path));
        }
        Ok(get_at(&self.properties, &to_pointer(path)).unwrap_or(&NULL))
    }

    /// Assigns a property value after type and allowed-value checks.
    ///
    /// With `shall_throw == false` every failure is a silent no-op.
    /// Untyped properties accept any value but log a warning. An object
    /// value is also checked against the schema entries defined below
    /// `path`.
    ///
    /// # Errors
    ///
    /// Returns [`XTypeError::UnknownProperty`], [`XTypeError::TypeMismatch`]
    /// or [`XTypeError::ValueNotAllowed`] when `shall_throw` is true.
    pub fn set_property(&mut self, path: &str, value: Value, shall_throw: bool) -> Result<()> {
        let pointer = to_pointer(path);
        let Some(def) = self.schema.get(&pointer) else {
            return self.fail(shall_throw, self.unknown_property(path));
        };
        if def.kind == ValueKind::Discarded {
            warn!(
                classname = %self.classname,
                property = %pointer,
                "no type defined for property, type safety is not assured"
            );
        }
        if let Err(err) = self.check_value(&pointer, def, &value) {
            return self.fail(shall_throw, err);
        }
        // nested schema entries carried by an object value
        let prefix = format!("{pointer}/");
        for (path, nested) in self.schema.entries() {
            let Some(relative) = path.strip_prefix(&prefix) else {
                continue;
            };
            if let Some(inner) = get_at(&value, &format!("/{relative}")) {
                if let Err(err) = self.check_value(path, nested, inner) {
                    return self.fail(shall_throw, err);
                }
            }
        }
        set_at(&mut self.properties, &pointer, value);
        Ok(())
    }

    fn check_value(&self, pointer: &str, def: &PropertyDef, value: &Value) -> Result<()> {
        if !def.kind.matches(value) {
            return Err(XTypeError::TypeMismatch {
                classname: self.classname.clone(),
                path: pointer.to_owned(),
                expected: def.kind,
                found: ValueKind::of(value),
            });
        }
        if !def.is_allowed_value(value) {
            return Err(XTypeError::ValueNotAllowed {
                classname: self.classname.clone(),
                path: pointer.to_owned(),
                value: value.to_string(),
            });
        }
        Ok(())
    }

    /// Returns the property value tree.
    #[must_use]
    pub fn get_properties(&self) -> &Value {
        &self.properties
    }

    /// Assigns every defined property found in `bag`.
    ///
    /// Keys of `bag` without a schema entry are ignored.
    ///
    /// # Errors
    ///
    /// Propagates the first [`set_property`](Self::set_property) failure when
    /// `shall_throw` is true.
    pub fn set_properties(&mut self, bag: &Value, shall_throw: bool) -> Result<()> {
        let paths: Vec<String> = self.schema.paths().map(str::to_owned).collect();
        for path in paths {
            if let Some(value) = get_at(bag, &path) {
                self.set_property(&path, value.clone(), shall_throw)?;
            }
        }
        Ok(())
    }

    fn unknown_property(&self, path: &str) -> XTypeError {
        XTypeError::UnknownProperty {
            classname: self.classname.clone(),
            path: to_pointer(path),
        }
    }

    fn fail(&self, shall_throw: bool, err: XTypeError) -> Result<()> {
        if shall_throw {
            Err(err)
        } else {
            Ok(())
        }
    }

    // Relations

    /// Defines a relation under the attribute `name`.
    ///
    /// With `inverse` the attribute stores the to side: from and to classes
    /// are swapped and the direction flag is cleared. Facts stay unknown.
    ///
    /// # Errors
    ///
    /// Without `override_existing`, returns
    /// [`XTypeError::RelationConflict`] if a structurally different relation
    /// exists under `name`, or [`XTypeError::DirectionConflict`] if it was
    /// defined with the other direction.
    pub fn define_relation(
        &mut self,
        name: &str,
        relation: Relation,
        inverse: bool,
        override_existing: bool,
    ) -> Result<()> {
        let relation = if inverse { relation.swapped() } else { relation };
        let forward = !inverse;
        match self.relations.get(name) {
            Some(existing) if !override_existing => {
                if *existing != relation {
                    return Err(XTypeError::RelationConflict {
                        classname: self.classname.clone(),
                        name: name.to_owned(),
                    });
                }
                if self.relation_dir_forward.get(name) != Some(&forward) {
                    return Err(XTypeError::DirectionConflict {
                        classname: self.classname.clone(),
                        name: name.to_owned(),
                    });
                }
                Ok(())
            }
            _ => {
                self.relations.insert(name.to_owned(), relation);
                self.relation_dir_forward.insert(name.to_owned(), forward);
                Ok(())
            }
        }
    }

    /// Defines a relation from the preset of `kind`, with this entity's
    /// class on the from side.
    ///
    /// # Errors
    ///
    /// Same as [`define_relation`](Self::define_relation).
    pub fn define_preset<I, S>(
        &mut self,
        name: &str,
        kind: RelationKind,
        other_classnames: I,
        edge_template: PropertySchema,
        inverse: bool,
        override_existing: bool,
    ) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let relation = Relation::from_preset(kind, [self.classname.clone()], other_classnames)
            .with_edge_template(edge_template);
        self.define_relation(name, relation, inverse, override_existing)
    }

    /// Checks whether a relation is defined under `name`.
    #[must_use]
    pub fn has_relation(&self, name: &str) -> bool {
        self.relations.contains_key(name)
    }

    /// Returns all relation definitions.
    #[must_use]
    pub fn relations(&self) -> &BTreeMap<String, Relation> {
        &self.relations
    }

    /// Returns the relation defined under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`XTypeError::UnknownRelation`] if none is defined.
    pub fn relation(&self, name: &str) -> Result<&Relation> {
        self.relations
            .get(name)
            .ok_or_else(|| self.unknown_relation(name))
    }

    /// Returns `true` if the attribute stores the forward side of its relation.
    ///
    /// # Errors
    ///
    /// Returns [`XTypeError::UnknownRelation`] if none is defined.
    pub fn relation_dir(&self, name: &str) -> Result<bool> {
        self.relation_dir_forward
            .get(name)
            .copied()
            .ok_or_else(|| self.unknown_relation(name))
    }

    /// Returns the cardinality after accounting for the attribute direction.
    ///
    /// # Errors
    ///
    /// Returns [`XTypeError::UnknownRelation`] if none is defined.
    pub fn effective_cardinality(&self, name: &str) -> Result<Cardinality> {
        let cardinality = self.relation(name)?.cardinality;
        Ok(if self.relation_dir(name)? {
            cardinality
        } else {
            cardinality.inverted()
        })
    }

    fn unknown_relation(&self, name: &str) -> XTypeError {
        XTypeError::UnknownRelation {
            classname: self.classname.clone(),
            name: name.to_owned(),
        }
    }

    // Facts

    /// Checks whether the facts of `name` are known (possibly empty).
    ///
    /// # Errors
    ///
    /// Returns [`XTypeError::UnknownRelation`] if no relation is defined.
    pub fn has_facts(&self, name: &str) -> Result<bool> {
        if !self.has_relation(name) {
            return Err(self.unknown_relation(name));
        }
        Ok(self.facts.contains_key(name))
    }

    /// Marks the unknown facts of `name` as known and empty.
    ///
    /// Does nothing for undefined relations or facts that are known already.
    pub fn set_unknown_fact_empty(&mut self, name: &str) {
        if self.has_relation(name) {
            self.facts.entry(name.to_owned()).or_default();
        }
    }

    /// Marks the facts of every defined relation as known.
    pub fn set_all_unknown_facts_empty(&mut self) {
        for name in self.relations.keys() {
            self.facts.entry(name.clone()).or_default();
        }
    }

    /// Returns the stored facts of `name` without resolving them.
    ///
    /// Use [`Registry::get_facts`](crate::Registry::get_facts) to resolve
    /// deferred facts.
    ///
    /// # Errors
    ///
    /// Returns [`XTypeError::UnknownRelation`] if no relation is defined, or
    /// [`XTypeError::FactsUnknown`] if the facts are unknown.
    pub fn facts(&self, name: &str) -> Result<&[Fact]> {
        if !self.has_facts(name)? {
            return Err(XTypeError::FactsUnknown {
                classname: self.classname.clone(),
                name: name.to_owned(),
            });
        }
        Ok(self.cached_facts(name).unwrap_or_default())
    }

    pub(crate) fn cached_facts(&self, name: &str) -> Option<&[Fact]> {
        self.facts.get(name).map(Vec::as_slice)
    }

    pub(crate) fn facts_mut(&mut self, name: &str) -> Option<&mut Vec<Fact>> {
        self.facts.get_mut(name)
    }

    /// Adds a fact known only by its target identifier.
    ///
    /// Edge properties are merged onto the relation's template. A fact with
    /// the same identifier is updated in place.
    ///
    /// # Errors
    ///
    /// Returns [`XTypeError::UnknownRelation`], a template validation error,
    /// or [`XTypeError::CardinalityViolation`].
    pub fn add_deferred_fact(&mut self, name: &str, uri: &str, edge_properties: &Value) -> Result<()> {
        self.upsert_fact(name, None, Some(uri.to_owned()), edge_properties)
            .map(|_| ())
    }

    /// Inserts or updates the fact pointing at `target` / `target_uri`.
    ///
    /// Returns `true` if a new fact was appended, `false` if an existing one
    /// was updated. The cardinality check happens before any mutation.
    pub(crate) fn upsert_fact(
        &mut self,
        name: &str,
        target: Option<EntityId>,
        target_uri: Option<String>,
        edge_properties: &Value,
    ) -> Result<bool> {
        let relation = self.relation(name)?;
        let merged = relation
            .edge_template
            .merge(edge_properties)
            .map_err(|e| e.for_class(&self.classname))?;
        let cardinality = self.effective_cardinality(name)?;
        let facts = self.facts.get(name).map(Vec::as_slice).unwrap_or_default();
        if let Some(index) = facts
            .iter()
            .position(|f| f.refers_to(target, target_uri.as_deref()))
        {
            if let Some(fact) = self.facts.get_mut(name).and_then(|fs| fs.get_mut(index)) {
                fact.upsert_properties(&merged);
                if target.is_some() && fact.target.is_none() {
                    fact.target = target;
                }
            }
            return Ok(false);
        }
        if !cardinality.allows_another(facts.len()) {
            return Err(XTypeError::CardinalityViolation {
                classname: self.classname.clone(),
                name: name.to_owned(),
                cardinality,
            });
        }
        self.facts.entry(name.to_owned()).or_default().push(Fact {
            target,
            target_uri,
            edge_properties: merged,
        });
        Ok(true)
    }

    /// Removes every fact of `name` that refers to the given target.
    ///
    /// Returns the number of removed facts.
    pub(crate) fn remove_facts(
        &mut self,
        name: &str,
        target: Option<EntityId>,
        target_uri: Option<&str>,
    ) -> Result<usize> {
        if !self.has_facts(name)? {
            return Ok(0);
        }
        let Some(facts) = self.facts.get_mut(name) else {
            return Ok(0);
        };
        let before = facts.len();
        facts.retain(|f| !f.refers_to(target, target_uri));
        Ok(before - facts.len())
    }
}
