//! Typed view of the wire format.
//!
//! A dump is a map from identifier to node, as produced by
//! [`export_to`](crate::serializer::export_to). These types let tooling
//! inspect and cut dumps without instantiating entities.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::relation::DeletePolicy;
use crate::uri::uri_to_uuid;

/// One edge of a wire node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeSpec {
    /// Identifier of the target node.
    pub target: String,
    /// Edge properties.
    #[serde(default)]
    pub edge_properties: Value,
    /// Delete policy of the relation, if exported with metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_policy: Option<DeletePolicy>,
    /// Direction of the relation attribute, if exported with metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation_dir_forward: Option<bool>,
}

/// One node of a dump.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Identifier.
    pub uri: String,
    /// Decimal fingerprint of the identifier.
    #[serde(default)]
    pub uuid: String,
    /// Registered classname.
    pub classname: String,
    /// Property value tree.
    #[serde(default = "empty_object")]
    pub properties: Value,
    /// Known relations; a missing name means unknown facts.
    #[serde(default)]
    pub relations: BTreeMap<String, Vec<EdgeSpec>>,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

/// A dump: nodes keyed by identifier.
pub type GraphDump = BTreeMap<String, NodeSpec>;

/// A consistency problem found by [`check_dump`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DumpIssue {
    /// The map key differs from the node identifier.
    KeyMismatch {
        /// Map key.
        key: String,
        /// Identifier stored in the node.
        uri: String,
    },
    /// The stored fingerprint is not the CRC-32 of the identifier.
    FingerprintMismatch {
        /// Node identifier.
        uri: String,
        /// Stored fingerprint.
        found: String,
        /// Expected fingerprint.
        expected: u32,
    },
    /// An edge points at a node missing from the dump.
    DanglingTarget {
        /// Source node identifier.
        uri: String,
        /// Relation attribute name.
        relation: String,
        /// Missing target identifier.
        target: String,
    },
}

impl fmt::Display for DumpIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DumpIssue::KeyMismatch { key, uri } => {
                write!(f, "node stored under {key} has identifier {uri}")
            }
            DumpIssue::FingerprintMismatch { uri, found, expected } => {
                write!(f, "{uri}: fingerprint {found} should be {expected}")
            }
            DumpIssue::DanglingTarget { uri, relation, target } => {
                write!(f, "{uri}: {relation} points at {target}, which is not in the dump")
            }
        }
    }
}

/// Reports keys, fingerprints and edge targets that do not line up.
///
/// Dangling targets are legal in partial dumps; callers decide whether they
/// matter.
#[must_use]
pub fn check_dump(dump: &GraphDump) -> Vec<DumpIssue> {
    let mut issues = Vec::new();
    for (key, node) in dump {
        if *key != node.uri {
            issues.push(DumpIssue::KeyMismatch {
                key: key.clone(),
                uri: node.uri.clone(),
            });
        }
        let expected = uri_to_uuid(&node.uri);
        if node.uuid != expected.to_string() {
            issues.push(DumpIssue::FingerprintMismatch {
                uri: node.uri.clone(),
                found: node.uuid.clone(),
                expected,
            });
        }
        for (relation, edges) in &node.relations {
            for edge in edges {
                if !dump.contains_key(&edge.target) {
                    issues.push(DumpIssue::DanglingTarget {
                        uri: node.uri.clone(),
                        relation: relation.clone(),
                        target: edge.target.clone(),
                    });
                }
            }
        }
    }
    issues
}

/// Cuts the part of `dump` reachable from `root` within `max_depth` hops.
///
/// Depth semantics match export: nodes at the limit keep their node entry
/// but lose their relations. A negative depth keeps everything reachable.
/// Missing nodes are skipped.
#[must_use]
pub fn subgraph(dump: &GraphDump, root: &str, max_depth: i32) -> GraphDump {
    let mut result = GraphDump::new();
    let mut seen: BTreeSet<&str> = BTreeSet::new();
    let mut to_visit: VecDeque<(i32, &str)> = VecDeque::from([(0, root)]);
    while let Some((depth, uri)) = to_visit.pop_front() {
        if !seen.insert(uri) {
            continue;
        }
        let Some(original) = dump.get(uri) else {
            continue;
        };
        let mut node = original.clone();
        if max_depth >= 0 && depth >= max_depth {
            node.relations.clear();
        } else {
            for edge in original.relations.values().flatten() {
                to_visit.push_back((depth.saturating_add(1), edge.target.as_str()));
            }
        }
        result.insert(uri.to_owned(), node);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(uri: &str, targets: &[&str]) -> NodeSpec {
        NodeSpec {
            uri: uri.to_owned(),
            uuid: uri_to_uuid(uri).to_string(),
            classname: "Node".to_owned(),
            properties: json!({}),
            relations: BTreeMap::from([(
                "next".to_owned(),
                targets
                    .iter()
                    .map(|t| EdgeSpec {
                        target: (*t).to_owned(),
                        edge_properties: json!({}),
                        delete_policy: None,
                        relation_dir_forward: None,
                    })
                    .collect(),
            )]),
        }
    }

    fn chain() -> GraphDump {
        [node("n://a", &["n://b"]), node("n://b", &["n://c"]), node("n://c", &["n://a"])]
            .into_iter()
            .map(|n| (n.uri.clone(), n))
            .collect()
    }

    #[test]
    fn parses_exported_nodes() {
        let value = json!({
            "uri": "n://a",
            "uuid": "1",
            "classname": "Node",
            "properties": {"name": "a"},
            "relations": {"next": [{"target": "n://b", "edge_properties": {},
                "delete_policy": "DELETETARGET", "relation_dir_forward": false}]}
        });
        let node: NodeSpec = serde_json::from_value(value).expect("node");
        assert_eq!(node.relations["next"][0].delete_policy, Some(DeletePolicy::Target));
        assert_eq!(node.relations["next"][0].relation_dir_forward, Some(false));
    }

    #[test]
    fn clean_cycle_has_no_issues() {
        assert!(check_dump(&chain()).is_empty());
    }

    #[test]
    fn issues_are_reported() {
        let mut dump = chain();
        dump.remove("n://c");
        if let Some(a) = dump.get_mut("n://a") {
            a.uuid = "0".to_owned();
        }
        let moved = node("n://x", &[]);
        dump.insert("n://y".to_owned(), moved);
        let issues = check_dump(&dump);
        assert_eq!(issues.len(), 3);
        assert!(issues.contains(&DumpIssue::DanglingTarget {
            uri: "n://b".into(),
            relation: "next".into(),
            target: "n://c".into(),
        }));
        assert!(issues.iter().any(|i| matches!(i, DumpIssue::KeyMismatch { .. })));
        assert!(issues.iter().any(|i| matches!(i, DumpIssue::FingerprintMismatch { .. })));
    }

    #[test]
    fn subgraph_depths() {
        let dump = chain();
        let cut = subgraph(&dump, "n://a", 1);
        assert_eq!(cut.keys().collect::<Vec<_>>(), ["n://a", "n://b"]);
        assert!(cut["n://b"].relations.is_empty());
        assert_eq!(subgraph(&dump, "n://a", -1), dump);
        assert!(subgraph(&dump, "n://missing", -1).is_empty());
    }
}
