//! Breadth-first export of an entity graph.

use std::collections::{BTreeMap, VecDeque};

use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::error::{Result, XTypeError};
use crate::registry::{EntityId, Registry};
use crate::relation::DeletePolicy;
use crate::serializer::ExportOptions;
use crate::uri::uri_to_uuid;

/// Exports the graph reachable from `root` as wire nodes keyed by identifier.
///
/// Every identifier is visited once, at the depth it is first seen, so
/// cycles terminate. Each visited entity is committed (overwriting) before
/// it is emitted. Only relations with known facts appear in a node;
/// deferred facts are resolved through the registry. A deferred target
/// that cannot be found is still emitted as an edge by its identifier, but
/// not visited.
///
/// # Errors
///
/// Returns [`XTypeError::InvalidUri`] if a visited entity has no valid
/// identifier, and any other error raised while resolving facts.
pub fn export_to(
    registry: &mut Registry,
    root: EntityId,
    options: &ExportOptions,
) -> Result<BTreeMap<String, Value>> {
    let mut result: BTreeMap<String, Value> = BTreeMap::new();
    let mut to_visit: VecDeque<(i32, EntityId)> = VecDeque::from([(0, root)]);

    while let Some((depth, id)) = to_visit.pop_front() {
        registry.refresh_facts(id)?;
        let entity = registry.entity(id)?;
        let uri = entity.uri().ok_or_else(|| XTypeError::InvalidUri {
            classname: entity.classname().to_owned(),
        })?;
        if result.contains_key(&uri) {
            continue;
        }
        registry.commit(id, true)?;

        let mut relations = Map::new();
        if options.expands(depth) {
            let entity = registry.entity(id)?;
            let known: Vec<(String, bool, DeletePolicy)> = entity
                .relations()
                .iter()
                .filter(|(name, _)| entity.has_facts(name).unwrap_or(false))
                .map(|(name, relation)| {
                    let forward = entity.relation_dir(name).unwrap_or(true);
                    (name.clone(), forward, relation.delete_policy)
                })
                .collect();
            for (name, forward, delete_policy) in known {
                let facts = registry.resolve_facts(id, &name, true)?;
                let mut entries = Vec::with_capacity(facts.len());
                for fact in facts {
                    let target_uri = fact.uri().ok_or_else(|| XTypeError::UnresolvableFact {
                        classname: registry
                            .entity(id)
                            .map(|e| e.classname().to_owned())
                            .unwrap_or_default(),
                        name: name.clone(),
                    })?;
                    let mut entry = Map::new();
                    entry.insert("target".to_owned(), json!(target_uri));
                    entry.insert("edge_properties".to_owned(), fact.edge_properties.clone());
                    if options.relation_metadata {
                        entry.insert("delete_policy".to_owned(), json!(delete_policy));
                        entry.insert("relation_dir_forward".to_owned(), json!(forward));
                    }
                    entries.push(Value::Object(entry));
                    match fact.target {
                        Some(target) => {
                            if !result.contains_key(target_uri) {
                                to_visit.push_back((depth.saturating_add(1), target));
                            }
                        }
                        None => warn!(
                            %uri,
                            relation = %name,
                            target = target_uri,
                            "exporting edge to a node that cannot be found"
                        ),
                    }
                }
                relations.insert(name, Value::Array(entries));
            }
        }

        let entity = registry.entity(id)?;
        let node = json!({
            "uri": uri,
            "uuid": uri_to_uuid(&uri).to_string(),
            "classname": entity.classname(),
            "properties": entity.get_properties(),
            "relations": relations,
        });
        debug!(%uri, depth, "exported node");
        result.insert(uri, node);
    }
    Ok(result)
}
