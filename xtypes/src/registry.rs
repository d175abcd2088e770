//! The registry: class factories, working copies and committed entities.
//!
//! A [`Registry`] owns every entity it creates. Working copies live in an
//! arena and are addressed by [`EntityId`] handles; committed entities live
//! in an identity map keyed by identifier and are only reachable through
//! fresh working copies ([`Registry::get_by_uri`]) or read-only views
//! ([`Registry::committed`]).

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use crate::entity::{Entity, BASE_CLASSNAME};
use crate::error::{Result, XTypeError};

static NEXT_REGISTRY_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistryId(u64);

impl fmt::Display for RegistryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Handle of a working instance inside a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId {
    registry: RegistryId,
    index: usize,
}

impl EntityId {
    /// Returns the registry that issued this handle.
    #[must_use]
    pub fn registry(self) -> RegistryId {
        self.registry
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.registry, self.index)
    }
}

/// A statically known entity class.
pub trait EntityClass: 'static {
    /// Registered classname.
    const CLASSNAME: &'static str;

    /// Builds a default instance with all properties and relations defined.
    fn construct() -> Entity;
}

/// Constructor of a registered class.
pub type Factory = Rc<dyn Fn() -> Entity>;

/// Hook resolving an identifier the registry does not know.
///
/// The hook builds the entity inside the given registry and returns its
/// handle, or `None` if the identifier does not exist.
pub type LoadFunc = Box<dyn FnMut(&mut Registry, &str) -> Result<Option<EntityId>>>;

/// Factory, identity map and arena of entities.
pub struct Registry {
    id: RegistryId,
    factories: BTreeMap<String, Factory>,
    // indices are never reused; a cleared slot expires its handle
    slots: Vec<Option<Entity>>,
    valid: BTreeMap<String, Entity>,
    valid_to_temporary: BTreeMap<String, EntityId>,
    load_func: Option<LoadFunc>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("id", &self.id)
            .field("classes", &self.factories.keys().collect::<Vec<_>>())
            .field("working", &self.slots.iter().flatten().count())
            .field("committed", &self.valid.keys().collect::<Vec<_>>())
            .field("load_func", &self.load_func.is_some())
            .finish()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Creates a registry that knows the base class.
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Self {
            id: RegistryId(NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed)),
            factories: BTreeMap::new(),
            slots: Vec::new(),
            valid: BTreeMap::new(),
            valid_to_temporary: BTreeMap::new(),
            load_func: None,
        };
        registry.register_factory(BASE_CLASSNAME, Entity::base);
        registry
    }

    /// Returns the identity of this registry.
    #[must_use]
    pub fn id(&self) -> RegistryId {
        self.id
    }

    // Classes

    /// Registers `T` under its classname, replacing any previous factory.
    pub fn register_class<T: EntityClass>(&mut self) {
        self.register_factory(T::CLASSNAME, T::construct);
    }

    /// Registers a factory under `classname`, replacing any previous one.
    pub fn register_factory(
        &mut self,
        classname: impl Into<String>,
        factory: impl Fn() -> Entity + 'static,
    ) {
        self.factories.insert(classname.into(), Rc::new(factory));
    }

    /// Makes `alias` construct the same class as `original`.
    ///
    /// # Errors
    ///
    /// Returns [`XTypeError::UnknownClass`] if `original` is not registered,
    /// or [`XTypeError::ClassAlreadyRegistered`] if `alias` is.
    pub fn register_alias(&mut self, original: &str, alias: &str) -> Result<()> {
        let factory = self
            .factories
            .get(original)
            .cloned()
            .ok_or_else(|| XTypeError::UnknownClass(original.to_owned()))?;
        if self.knows_class(alias) {
            return Err(XTypeError::ClassAlreadyRegistered(alias.to_owned()));
        }
        self.factories.insert(alias.to_owned(), factory);
        Ok(())
    }

    /// Checks whether a factory is registered under `classname`.
    #[must_use]
    pub fn knows_class(&self, classname: &str) -> bool {
        self.factories.contains_key(classname)
    }

    /// Returns all registered classnames.
    pub fn classnames(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Adds the factories of `other` for classnames not known here.
    ///
    /// Entities are not imported.
    pub fn import_from(&mut self, other: &Registry) {
        for (classname, factory) in &other.factories {
            if !self.knows_class(classname) {
                self.factories.insert(classname.clone(), Rc::clone(factory));
            }
        }
    }

    // Working instances

    /// Creates a working instance of `classname` bound to this registry.
    ///
    /// # Errors
    ///
    /// Returns [`XTypeError::UnknownClass`] if no factory is registered.
    pub fn instantiate_from(&mut self, classname: &str) -> Result<EntityId> {
        let mut entity = self.construct(classname)?;
        entity.set_registry_once(self.id);
        let id = EntityId {
            registry: self.id,
            index: self.slots.len(),
        };
        self.slots.push(Some(entity));
        debug!(%id, classname, "created working instance");
        Ok(id)
    }

    /// Creates a working instance of `T`.
    ///
    /// # Errors
    ///
    /// Returns [`XTypeError::UnknownClass`] if `T` is not registered.
    pub fn instantiate<T: EntityClass>(&mut self) -> Result<EntityId> {
        self.instantiate_from(T::CLASSNAME)
    }

    fn construct(&self, classname: &str) -> Result<Entity> {
        self.factories
            .get(classname)
            .map(|factory| factory())
            .ok_or_else(|| XTypeError::UnknownClass(classname.to_owned()))
    }

    fn slot_index(&self, id: EntityId) -> Result<usize> {
        if id.registry != self.id {
            return Err(XTypeError::ForeignEntity(id.to_string()));
        }
        match self.slots.get(id.index) {
            Some(Some(_)) => Ok(id.index),
            _ => Err(XTypeError::UnknownEntity(id.to_string())),
        }
    }

    /// Checks whether `id` refers to a live working instance of this registry.
    #[must_use]
    pub fn is_alive(&self, id: EntityId) -> bool {
        self.slot_index(id).is_ok()
    }

    /// Returns the working instance behind `id`.
    ///
    /// # Errors
    ///
    /// Returns [`XTypeError::ForeignEntity`] or [`XTypeError::UnknownEntity`].
    pub fn entity(&self, id: EntityId) -> Result<&Entity> {
        let index = self.slot_index(id)?;
        self.slots
            .get(index)
            .and_then(Option::as_ref)
            .ok_or_else(|| XTypeError::UnknownEntity(id.to_string()))
    }

    /// Returns the working instance behind `id` for mutation.
    ///
    /// # Errors
    ///
    /// Returns [`XTypeError::ForeignEntity`] or [`XTypeError::UnknownEntity`].
    pub fn entity_mut(&mut self, id: EntityId) -> Result<&mut Entity> {
        let index = self.slot_index(id)?;
        self.slots
            .get_mut(index)
            .and_then(Option::as_mut)
            .ok_or_else(|| XTypeError::UnknownEntity(id.to_string()))
    }

    /// Releases a working instance and returns it. Its handle expires.
    ///
    /// # Errors
    ///
    /// Returns [`XTypeError::ForeignEntity`] or [`XTypeError::UnknownEntity`].
    pub fn discard(&mut self, id: EntityId) -> Result<Entity> {
        let index = self.slot_index(id)?;
        self.valid_to_temporary.retain(|_, working| *working != id);
        self.slots
            .get_mut(index)
            .and_then(Option::take)
            .ok_or_else(|| XTypeError::UnknownEntity(id.to_string()))
    }

    // Committed entities

    /// Checks whether an entity is committed under `uri`.
    #[must_use]
    pub fn knows_uri(&self, uri: &str) -> bool {
        self.valid.contains_key(uri)
    }

    /// Returns a read-only view of the entity committed under `uri`.
    #[must_use]
    pub fn committed(&self, uri: &str) -> Option<&Entity> {
        self.valid.get(uri)
    }

    /// Returns all committed identifiers.
    pub fn committed_uris(&self) -> impl Iterator<Item = &str> {
        self.valid.keys().map(String::as_str)
    }

    /// Commits the working instance behind `id` under its current identifier.
    ///
    /// Cached fact identifiers are refreshed first, so relation-based
    /// identifier parts follow renamed neighbours. An existing committed
    /// entity is only replaced if `overwrite` is set. Working copies of the
    /// identifier are left untouched.
    ///
    /// # Errors
    ///
    /// Returns handle errors, [`XTypeError::InvalidUri`] if the identifier
    /// cannot be computed, or [`XTypeError::UnknownClass`].
    pub fn commit(&mut self, id: EntityId, overwrite: bool) -> Result<()> {
        self.refresh_facts(id)?;
        let registry = self.id;
        let entity = self.entity_mut(id)?;
        entity.set_registry_once(registry);
        let snapshot = entity.clone();
        self.commit_entity(&snapshot, overwrite)
    }

    /// Commits a copy of `entity` under its current identifier.
    ///
    /// The committed copy is built by the registered factory and then takes
    /// over the full state of `entity`; it is always bound to this registry.
    ///
    /// # Errors
    ///
    /// Returns [`XTypeError::InvalidUri`] if the identifier cannot be
    /// computed, or [`XTypeError::UnknownClass`] if the class is not
    /// registered.
    pub fn commit_entity(&mut self, entity: &Entity, overwrite: bool) -> Result<()> {
        let uri = entity.uri().ok_or_else(|| XTypeError::InvalidUri {
            classname: entity.classname().to_owned(),
        })?;
        match self.valid.get_mut(&uri) {
            Some(existing) => {
                if overwrite {
                    existing.copy_state_from(entity);
                    debug!(%uri, "overwrote committed entity");
                }
                existing.overwrite_registry(self.id);
            }
            None => {
                let mut slot = self.construct(entity.classname())?;
                slot.copy_state_from(entity);
                slot.overwrite_registry(self.id);
                self.valid.insert(uri.clone(), slot);
                debug!(%uri, "committed entity");
            }
        }
        Ok(())
    }

    /// Returns a working copy of the entity known under `uri`.
    ///
    /// A live working copy handed out before is returned again, even if its
    /// identifier has changed since; it then becomes reachable under both
    /// identifiers. Otherwise a fresh copy of the committed entity is made.
    pub fn get_by_uri(&mut self, uri: &str) -> Option<EntityId> {
        if let Some(&id) = self.valid_to_temporary.get(uri) {
            if let Ok(entity) = self.entity(id) {
                if let Some(current) = entity.uri().filter(|current| current != uri) {
                    self.valid_to_temporary.insert(current, id);
                }
                return Some(id);
            }
        }
        let classname = self.valid.get(uri)?.classname().to_owned();
        let id = self.instantiate_from(&classname).ok()?;
        if let (Some(valid), Some(Some(working))) = (self.valid.get(uri), self.slots.get_mut(id.index)) {
            working.copy_state_from(valid);
        }
        self.valid_to_temporary.insert(uri.to_owned(), id);
        Some(id)
    }

    /// Returns a working copy of `uri`, asking the loader if it is unknown.
    ///
    /// The instance built by the loader is committed if needed and handed
    /// back as the working copy of `uri`; it is released when another live
    /// copy of `uri` already exists or when its identifier does not match.
    ///
    /// # Errors
    ///
    /// Returns [`XTypeError::NotFound`] if no loader is set (or the loader is
    /// already running) or the loader does not know `uri`,
    /// [`XTypeError::UriMismatch`] if the loaded entity has a different
    /// identifier, and any error raised by the loader or by the commit.
    pub fn load_by_uri(&mut self, uri: &str) -> Result<EntityId> {
        if let Some(id) = self.get_by_uri(uri) {
            return Ok(id);
        }
        let Some(mut load) = self.load_func.take() else {
            return Err(XTypeError::NotFound(uri.to_owned()));
        };
        debug!(uri, "invoking loader");
        let loaded = load(self, uri);
        if self.load_func.is_none() {
            self.load_func = Some(load);
        }
        let id = loaded?.ok_or_else(|| XTypeError::NotFound(uri.to_owned()))?;
        let loaded_uri = self.entity(id)?.uri();
        if loaded_uri.as_deref() != Some(uri) {
            self.discard(id)?;
            return Err(XTypeError::UriMismatch {
                requested: uri.to_owned(),
                loaded: loaded_uri.unwrap_or_default(),
            });
        }
        if !self.knows_uri(uri) {
            self.commit(id, true)?;
        }
        match self.valid_to_temporary.get(uri).copied() {
            Some(working) if working != id && self.is_alive(working) => {
                self.discard(id)?;
                Ok(working)
            }
            _ => {
                self.valid_to_temporary.insert(uri.to_owned(), id);
                Ok(id)
            }
        }
    }

    /// Installs the loader hook, replacing any previous one.
    pub fn set_load_func(
        &mut self,
        load: impl FnMut(&mut Registry, &str) -> Result<Option<EntityId>> + 'static,
    ) {
        self.load_func = Some(Box::new(load));
    }

    /// Checks whether a loader hook is installed.
    #[must_use]
    pub fn has_load_func(&self) -> bool {
        self.load_func.is_some()
    }

    /// Forgets the committed entity under `uri` and its working-copy index.
    ///
    /// Facts of other entities pointing at `uri` are not touched; the next
    /// lookup goes through the loader. Returns `true` if something was
    /// committed under `uri`.
    pub fn drop_uri(&mut self, uri: &str) -> bool {
        self.valid_to_temporary.remove(uri);
        self.valid.remove(uri).is_some()
    }

    /// Forgets all committed entities and releases all working instances.
    ///
    /// Factories and the loader hook are kept.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.valid_to_temporary.clear();
        self.valid.clear();
        debug!(registry = %self.id, "cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uri::UriTemplate;
    use crate::value::ValueKind;
    use serde_json::json;

    struct Part;

    impl EntityClass for Part {
        const CLASSNAME: &'static str = "Part";

        fn construct() -> Entity {
            let mut entity = Entity::new(Self::CLASSNAME)
                .with_uri_template(UriTemplate::new("parts", "").property("name", true));
            entity
                .define_property("name", ValueKind::String, vec![], json!(""), false)
                .expect("name property");
            entity
        }
    }

    fn named_part(registry: &mut Registry, name: &str) -> EntityId {
        let id = registry.instantiate::<Part>().expect("registered");
        registry
            .entity_mut(id)
            .and_then(|e| e.set_property("name", json!(name), true))
            .expect("name");
        id
    }

    #[test]
    fn registry_ids_are_unique() {
        assert_ne!(Registry::new().id(), Registry::new().id());
    }

    #[test]
    fn base_class_is_registered() {
        let mut registry = Registry::new();
        assert!(registry.knows_class(BASE_CLASSNAME));
        let id = registry.instantiate_from(BASE_CLASSNAME).expect("base");
        assert_eq!(registry.entity(id).ok().and_then(Entity::registry), Some(registry.id()));
        assert!(matches!(
            registry.instantiate_from("Nope"),
            Err(XTypeError::UnknownClass(_))
        ));
    }

    #[test]
    fn aliases() {
        let mut registry = Registry::new();
        registry.register_class::<Part>();
        registry.register_alias("Part", "Piece").expect("alias");
        assert!(matches!(
            registry.register_alias("Part", "Piece"),
            Err(XTypeError::ClassAlreadyRegistered(_))
        ));
        assert!(matches!(
            registry.register_alias("Nope", "Other"),
            Err(XTypeError::UnknownClass(_))
        ));
        let id = registry.instantiate_from("Piece").expect("alias");
        assert_eq!(registry.entity(id).map(Entity::classname).ok(), Some("Part"));
    }

    #[test]
    fn handles_are_scoped() {
        let mut a = Registry::new();
        let b = Registry::new();
        let id = a.instantiate_from(BASE_CLASSNAME).expect("base");
        assert!(matches!(b.entity(id), Err(XTypeError::ForeignEntity(_))));
        a.discard(id).expect("discard");
        assert!(matches!(a.entity(id), Err(XTypeError::UnknownEntity(_))));
        assert!(!a.is_alive(id));
    }

    #[test]
    fn commit_requires_valid_uri() {
        let mut registry = Registry::new();
        registry.register_class::<Part>();
        let id = registry.instantiate::<Part>().expect("part");
        assert!(matches!(
            registry.commit(id, false),
            Err(XTypeError::InvalidUri { .. })
        ));
        registry
            .entity_mut(id)
            .and_then(|e| e.set_property("name", json!("bolt"), true))
            .expect("name");
        registry.commit(id, false).expect("commit");
        assert!(registry.knows_uri("parts://bolt"));
    }

    #[test]
    fn working_copies_are_cached() {
        let mut registry = Registry::new();
        registry.register_class::<Part>();
        let id = named_part(&mut registry, "bolt");
        registry.commit(id, false).expect("commit");

        let first = registry.get_by_uri("parts://bolt").expect("known");
        assert_ne!(first, id);
        assert_eq!(registry.get_by_uri("parts://bolt"), Some(first));

        registry
            .entity_mut(first)
            .and_then(|e| e.set_property("name", json!("nut"), true))
            .expect("rename");
        assert_eq!(registry.get_by_uri("parts://bolt"), Some(first));
        assert_eq!(registry.get_by_uri("parts://nut"), Some(first));
        assert!(!registry.knows_uri("parts://nut"));
        assert_eq!(registry.get_by_uri("parts://missing"), None);
    }

    #[test]
    fn loader_is_consulted_once() {
        let mut registry = Registry::new();
        registry.register_class::<Part>();
        assert!(matches!(
            registry.load_by_uri("parts://bolt"),
            Err(XTypeError::NotFound(_))
        ));
        registry.set_load_func(|registry, uri| {
            let Some(name) = uri.strip_prefix("parts://") else {
                return Ok(None);
            };
            Ok(Some(named_part(registry, name)))
        });
        let id = registry.load_by_uri("parts://bolt").expect("loaded");
        assert!(registry.knows_uri("parts://bolt"));
        assert_eq!(registry.load_by_uri("parts://bolt").ok(), Some(id));
        assert!(matches!(
            registry.load_by_uri("other://x"),
            Err(XTypeError::NotFound(_))
        ));
    }

    #[test]
    fn loader_mismatch_is_rejected() {
        let built = Rc::new(std::cell::Cell::new(None));
        let seen = Rc::clone(&built);
        let mut registry = Registry::new();
        registry.register_class::<Part>();
        registry.set_load_func(move |registry, _| {
            let id = named_part(registry, "other");
            seen.set(Some(id));
            Ok(Some(id))
        });
        assert!(matches!(
            registry.load_by_uri("parts://bolt"),
            Err(XTypeError::UriMismatch { .. })
        ));
        let orphan = built.get().expect("loader ran");
        assert!(!registry.is_alive(orphan));
        assert_eq!(registry.committed_uris().count(), 0);
    }

    #[test]
    fn loaded_instance_becomes_the_working_copy() {
        let built = Rc::new(std::cell::Cell::new(None));
        let seen = Rc::clone(&built);
        let mut registry = Registry::new();
        registry.register_class::<Part>();
        registry.set_load_func(move |registry, uri| {
            let name = uri.strip_prefix("parts://").unwrap_or(uri);
            let id = named_part(registry, name);
            seen.set(Some(id));
            Ok(Some(id))
        });
        let id = registry.load_by_uri("parts://bolt").expect("loaded");
        assert_eq!(built.get(), Some(id));
        assert_eq!(registry.get_by_uri("parts://bolt"), Some(id));
    }

    #[test]
    fn reentrant_load_is_not_found() {
        let mut registry = Registry::new();
        registry.set_load_func(|registry, uri| {
            let inner = registry.load_by_uri(uri);
            assert!(matches!(inner, Err(XTypeError::NotFound(_))));
            Ok(None)
        });
        assert!(registry.load_by_uri("xtypes://x").is_err());
        assert!(registry.has_load_func());
    }

    #[test]
    fn drop_and_clear_do_not_cascade() {
        let mut registry = Registry::new();
        registry.register_class::<Part>();
        let id = named_part(&mut registry, "bolt");
        registry.commit(id, false).expect("commit");
        assert!(registry.drop_uri("parts://bolt"));
        assert!(!registry.drop_uri("parts://bolt"));
        assert!(registry.is_alive(id));
        registry.clear();
        assert!(!registry.is_alive(id));
        assert!(registry.knows_class("Part"));
    }

    #[test]
    fn import_merges_factories_only() {
        let mut source = Registry::new();
        source.register_class::<Part>();
        let id = named_part(&mut source, "bolt");
        source.commit(id, false).expect("commit");

        let mut target = Registry::new();
        target.import_from(&source);
        assert!(target.knows_class("Part"));
        assert!(!target.knows_uri("parts://bolt"));
    }
}
