//! Import of wire nodes into a registry.
//!
//! [`import_from`] imports exactly one node: edges become deferred facts
//! resolved later through the registry. [`install_spec_loader`] turns a
//! node source into the registry's loader so those deferred facts pull
//! their targets in on demand. [`import_graph`] imports a whole
//! neighbourhood eagerly in two phases: nodes first, then edges.

use std::collections::{BTreeMap, VecDeque};

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Result, XTypeError};
use crate::registry::{EntityId, Registry};

/// Imports a single wire node and returns a working copy of the committed
/// entity.
///
/// Properties go through [`Entity::set_properties`](crate::Entity::set_properties),
/// so keys without a schema entry are ignored. Every relation listed in the
/// node becomes known and holds one deferred fact per edge. Nodes without a
/// `properties` or `relations` section are read in the older flat layout.
///
/// # Errors
///
/// Returns [`XTypeError::MissingField`] if `uri` or `classname` is missing,
/// [`XTypeError::UnknownClass`] if the registry does not know the class,
/// [`XTypeError::InvalidSpec`] for malformed sections, property or edge
/// validation errors, and [`XTypeError::InvalidUri`] if the assembled
/// entity has no valid identifier. Nothing is committed on failure.
pub fn import_from(spec: &Value, registry: &mut Registry) -> Result<EntityId> {
    import_node(spec, registry, None)
}

/// Installs a loader that imports nodes fetched from `source`.
///
/// `source` returns the wire node for an identifier, or `None` if it does
/// not exist. Together with deferred facts this imports a graph lazily: a
/// target node is fetched the first time a fact pointing at it is resolved.
/// A node that computes a different identifier than the requested one is
/// rejected with [`XTypeError::UriMismatch`] before anything is committed.
pub fn install_spec_loader(
    registry: &mut Registry,
    mut source: impl FnMut(&str) -> Option<Value> + 'static,
) {
    registry.set_load_func(move |registry, uri| match source(uri) {
        Some(spec) => import_node(&spec, registry, Some(uri)).map(Some),
        None => Ok(None),
    });
}

/// Imports one node; with `requested` set, the computed identifier must
/// equal it.
fn import_node(spec: &Value, registry: &mut Registry, requested: Option<&str>) -> Result<EntityId> {
    let (id, spec_uri) = instantiate_node(spec, registry)?;
    let committed = assemble(spec, registry, id, &spec_uri).and_then(|()| {
        let uri = registry.entity(id)?.uri().ok_or_else(|| XTypeError::InvalidUri {
            classname: registry
                .entity(id)
                .map(|e| e.classname().to_owned())
                .unwrap_or_default(),
        })?;
        if let Some(requested) = requested.filter(|requested| *requested != uri) {
            return Err(XTypeError::UriMismatch {
                requested: requested.to_owned(),
                loaded: uri,
            });
        }
        if uri != spec_uri {
            warn!(%spec_uri, %uri, "imported node computes a different identifier");
        }
        registry.commit(id, true)?;
        Ok(uri)
    });
    registry.discard(id)?;
    let uri = committed?;
    debug!(%uri, "imported node");
    registry
        .get_by_uri(&uri)
        .ok_or(XTypeError::NotFound(uri))
}

/// Imports the neighbourhood of `root_uri` eagerly.
///
/// Nodes are fetched breadth-first from `source` up to `max_depth`
/// (negative means unbounded); relations of nodes at the depth limit stay
/// unknown. Once every node exists, edges between imported nodes become
/// resolved facts (with inverse mirroring) and edges to nodes that could
/// not be fetched stay deferred. All imported entities are committed and
/// the working instance of the root is returned.
///
/// # Errors
///
/// Returns [`XTypeError::NotFound`] if `source` does not know `root_uri`,
/// the errors of [`import_from`] for any node, and fact errors raised while
/// wiring edges.
pub fn import_graph(
    root_uri: &str,
    mut source: impl FnMut(&str) -> Option<Value>,
    registry: &mut Registry,
    max_depth: i32,
) -> Result<EntityId> {
    struct Edge {
        source: String,
        name: String,
        target: String,
        edge_properties: Value,
    }

    let root_spec = source(root_uri).ok_or_else(|| XTypeError::NotFound(root_uri.to_owned()))?;
    let mut resolved: BTreeMap<String, EntityId> = BTreeMap::new();
    let mut fetched: BTreeMap<String, Value> = BTreeMap::new();
    let mut edges: Vec<Edge> = Vec::new();
    let mut to_import: VecDeque<(i32, Value)> = VecDeque::from([(0, root_spec)]);

    // nodes
    while let Some((depth, spec)) = to_import.pop_front() {
        let uri = required_str(&spec, "uri")?;
        if resolved.contains_key(uri) {
            continue;
        }
        let (id, uri) = instantiate_node(&spec, registry)?;
        resolved.insert(uri.clone(), id);
        if max_depth >= 0 && depth >= max_depth {
            continue;
        }
        let section = relation_section(&spec, &uri);
        let names: Vec<String> = registry.entity(id)?.relations().keys().cloned().collect();
        for name in names {
            let Some(listed) = section.get(&name) else {
                continue;
            };
            registry.entity_mut(id)?.set_unknown_fact_empty(&name);
            for edge in edge_list(listed, &name)? {
                let target = required_str(edge, "target")?.to_owned();
                edges.push(Edge {
                    source: uri.clone(),
                    name: name.clone(),
                    target: target.clone(),
                    edge_properties: edge.get("edge_properties").cloned().unwrap_or(Value::Null),
                });
                if resolved.contains_key(&target) {
                    continue;
                }
                if !fetched.contains_key(&target) {
                    let Some(other) = source(&target) else {
                        warn!(%uri, %target, "could not fetch referenced node, edge stays deferred");
                        continue;
                    };
                    fetched.insert(target.clone(), other);
                }
                if let Some(other) = fetched.get(&target) {
                    to_import.push_back((depth.saturating_add(1), other.clone()));
                }
            }
        }
    }

    // edges
    for edge in &edges {
        let Some(&source_id) = resolved.get(&edge.source) else {
            continue;
        };
        match resolved.get(&edge.target) {
            Some(&target_id) => {
                registry.add_fact(source_id, &edge.name, target_id, &edge.edge_properties)?;
            }
            None => registry.entity_mut(source_id)?.add_deferred_fact(
                &edge.name,
                &edge.target,
                &edge.edge_properties,
            )?,
        }
    }

    for &id in resolved.values() {
        registry.commit(id, true)?;
    }
    debug!(root = root_uri, nodes = resolved.len(), edges = edges.len(), "imported graph");
    resolved
        .get(root_uri)
        .copied()
        .ok_or_else(|| XTypeError::NotFound(root_uri.to_owned()))
}

/// Creates the working instance for `spec` and applies its properties.
fn instantiate_node(spec: &Value, registry: &mut Registry) -> Result<(EntityId, String)> {
    if !spec.is_object() {
        return Err(XTypeError::InvalidSpec("node is not an object".to_owned()));
    }
    let uri = required_str(spec, "uri")?.to_owned();
    let classname = required_str(spec, "classname")?;
    if !registry.knows_class(classname) {
        return Err(XTypeError::UnknownClass(classname.to_owned()));
    }
    let id = registry.instantiate_from(classname)?;
    let applied = match spec.get("properties") {
        Some(properties) => registry.entity_mut(id)?.set_properties(properties, true),
        None => {
            warn!(%uri, "no properties section, reading flat node layout");
            registry.entity_mut(id)?.set_properties(spec, false)
        }
    };
    if let Err(err) = applied {
        registry.discard(id)?;
        return Err(err);
    }
    Ok((id, uri))
}

/// Adds one deferred fact per listed edge.
fn assemble(spec: &Value, registry: &mut Registry, id: EntityId, uri: &str) -> Result<()> {
    let section = relation_section(spec, uri);
    let names: Vec<String> = registry.entity(id)?.relations().keys().cloned().collect();
    for name in names {
        let Some(listed) = section.get(&name) else {
            continue;
        };
        let entity = registry.entity_mut(id)?;
        entity.set_unknown_fact_empty(&name);
        for edge in edge_list(listed, &name)? {
            let target = required_str(edge, "target")?;
            let edge_properties = edge.get("edge_properties").unwrap_or(&Value::Null);
            entity.add_deferred_fact(&name, target, edge_properties)?;
        }
    }
    Ok(())
}

fn relation_section<'a>(spec: &'a Value, uri: &str) -> &'a Value {
    match spec.get("relations") {
        Some(relations) => relations,
        None => {
            warn!(%uri, "no relations section, reading flat node layout");
            spec
        }
    }
}

fn edge_list<'a>(listed: &'a Value, name: &str) -> Result<&'a Vec<Value>> {
    listed
        .as_array()
        .ok_or_else(|| XTypeError::InvalidSpec(format!("relation {name} is not a list of edges")))
}

fn required_str<'a>(spec: &'a Value, field: &'static str) -> Result<&'a str> {
    match spec.get(field) {
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(XTypeError::InvalidSpec(format!("{field} is not a string"))),
        None => Err(XTypeError::MissingField { field }),
    }
}
