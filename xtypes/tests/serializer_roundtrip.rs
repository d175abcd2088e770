//! Export and import against the wire format.

mod common;

use std::collections::BTreeMap;

use common::{registry, spawn, Component, Link};
use serde_json::{json, Value};
use xtypes::serializer::wire::{check_dump, subgraph, GraphDump, NodeSpec};
use xtypes::serializer::{export_to, import_from, import_graph, install_spec_loader};
use xtypes::{uri_to_uuid, EntityClass, ExportOptions, XTypeError};

fn cyclic() -> (xtypes::Registry, xtypes::EntityId) {
    let mut registry = registry();
    let a = spawn::<Component>(&mut registry, "a");
    let b = spawn::<Component>(&mut registry, "b");
    registry.add_fact(a, "conn", b, &json!({})).expect("a -> b");
    registry.add_fact(b, "conn", a, &json!({})).expect("b -> a");
    (registry, a)
}

#[test]
fn cyclic_export_visits_each_node_once() {
    let (mut registry, a) = cyclic();
    let dump = export_to(&mut registry, a, &ExportOptions::new()).expect("export");
    assert_eq!(
        dump.keys().collect::<Vec<_>>(),
        ["robot://components/a", "robot://components/b"]
    );
    assert_eq!(
        dump["robot://components/b"]["relations"]["conn"],
        json!([{"target": "robot://components/a", "edge_properties": {"weight": 1}}])
    );
    assert!(registry.knows_uri("robot://components/a"));
    assert!(registry.knows_uri("robot://components/b"));
}

#[test]
fn export_node_layout() {
    let (mut registry, a) = cyclic();
    let dump = export_to(&mut registry, a, &ExportOptions::new().max_depth(1)).expect("export");
    let node = &dump["robot://components/a"];
    assert_eq!(node["uri"], json!("robot://components/a"));
    assert_eq!(node["uuid"], json!(uri_to_uuid("robot://components/a").to_string()));
    assert_eq!(node["classname"], json!(Component::CLASSNAME));
    assert_eq!(node["properties"]["direction"], json!("out"));
    // b sits at the depth limit
    assert_eq!(dump["robot://components/b"]["relations"], json!({}));
}

#[test]
fn exported_dump_is_consistent() {
    let mut registry = registry();
    let arm = spawn::<Component>(&mut registry, "arm");
    for name in ["l1", "l2"] {
        let link = spawn::<Link>(&mut registry, name);
        registry.add_fact(arm, "links", link, &json!({"weight": 2})).expect("link");
    }
    let options = ExportOptions::new().relation_metadata(true);
    let dump = export_to(&mut registry, arm, &options).expect("export");
    let typed: GraphDump = dump
        .iter()
        .map(|(uri, node)| {
            let node: NodeSpec = serde_json::from_value(node.clone()).expect("wire node");
            (uri.clone(), node)
        })
        .collect();
    assert!(check_dump(&typed).is_empty());
    let owner = &typed["robot://links/l1"].relations["owner"][0];
    assert_eq!(owner.target, "robot://components/arm");
    assert_eq!(owner.relation_dir_forward, Some(false));
    assert_eq!(subgraph(&typed, "robot://links/l2", 1).len(), 2);
}

#[test]
fn import_then_resolve_lazily() {
    let mut source = registry();
    let arm = spawn::<Component>(&mut source, "arm");
    let l1 = spawn::<Link>(&mut source, "l1");
    source.add_fact(arm, "links", l1, &json!({"weight": 7})).expect("link");
    let dump: BTreeMap<String, Value> =
        export_to(&mut source, arm, &ExportOptions::new()).expect("export");

    let mut target = registry();
    install_spec_loader(&mut target, move |uri| dump.get(uri).cloned());
    let arm = target.load_by_uri("robot://components/arm").expect("arm");
    assert!(!target.knows_uri("robot://links/l1"));
    let stored = target.entity(arm).and_then(|e| e.facts("links")).expect("known");
    assert_eq!(stored[0].target, None);

    let links = target.get_facts(arm, "links").expect("resolved");
    assert_eq!(links[0].edge_properties, json!({"weight": 7}));
    let link = links[0].target.expect("handle");
    let owners = target.get_facts(link, "owner").expect("owner");
    assert_eq!(owners.len(), 1);
    assert_eq!(owners[0].uri(), Some("robot://components/arm"));
}

#[test]
fn import_requires_a_known_class() {
    let mut registry = registry();
    let err = import_from(
        &json!({"uri": "robot://x/y", "classname": "robot::Unknown", "properties": {}}),
        &mut registry,
    )
    .expect_err("unknown class");
    assert!(matches!(err, XTypeError::UnknownClass(_)));
}

#[test]
fn imported_graph_with_missing_node_exports() {
    let source = |uri: &str| -> Option<Value> {
        (uri == "robot://components/a").then(|| {
            json!({"uri": uri, "classname": Component::CLASSNAME, "properties": {"name": "a"},
                "relations": {"conn": [{"target": "robot://components/missing", "edge_properties": {}}]}})
        })
    };
    let mut registry = registry();
    let a = import_graph("robot://components/a", source, &mut registry, -1).expect("import");
    let dump = export_to(&mut registry, a, &ExportOptions::new()).expect("export");
    assert_eq!(dump.len(), 1);
    assert_eq!(
        dump["robot://components/a"]["relations"]["conn"],
        json!([{"target": "robot://components/missing", "edge_properties": {"weight": 1}}])
    );
    assert!(matches!(
        registry.get_facts(a, "conn"),
        Err(XTypeError::NotFound(_))
    ));
}
