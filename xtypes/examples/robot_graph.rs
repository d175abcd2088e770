//! Builds a small robot graph, exports it and imports it lazily into a
//! second registry.
//!
//! Run with: `cargo run --example robot_graph -p xtypes`

use serde_json::json;
use xtypes::serializer::{export_to, install_spec_loader};
use xtypes::{
    Entity, EntityClass, ExportOptions, PropertySchema, Registry, RelationKind, UriTemplate,
    ValueKind, XTypeError,
};

struct Component;

impl EntityClass for Component {
    const CLASSNAME: &'static str = "robot::Component";

    fn construct() -> Entity {
        let mut entity = Entity::new(Self::CLASSNAME)
            .with_uri_template(UriTemplate::new("robot", "components").property("name", true));
        let defined = entity
            .define_property("name", ValueKind::String, vec![], json!(""), false)
            .and_then(|()| {
                entity.define_preset("links", RelationKind::Has, [Link::CLASSNAME], PropertySchema::new(), false, false)
            });
        if let Err(err) = defined {
            eprintln!("schema error: {err}");
        }
        entity
    }
}

struct Link;

impl EntityClass for Link {
    const CLASSNAME: &'static str = "robot::Link";

    fn construct() -> Entity {
        let mut entity = Entity::new(Self::CLASSNAME)
            .with_uri_template(UriTemplate::new("robot", "links").property("name", true));
        let defined = entity
            .define_property("name", ValueKind::String, vec![], json!(""), false)
            .and_then(|()| {
                entity.define_preset("owner", RelationKind::Has, [Component::CLASSNAME], PropertySchema::new(), true, false)
            });
        if let Err(err) = defined {
            eprintln!("schema error: {err}");
        }
        entity
    }
}

fn robot_registry() -> Registry {
    let mut registry = Registry::new();
    registry.register_class::<Component>();
    registry.register_class::<Link>();
    registry
}

fn main() -> Result<(), XTypeError> {
    let mut registry = robot_registry();
    let arm = registry.instantiate::<Component>()?;
    registry.entity_mut(arm)?.set_property("name", json!("arm"), true)?;
    for name in ["upper", "lower"] {
        let link = registry.instantiate::<Link>()?;
        registry.entity_mut(link)?.set_property("name", json!(name), true)?;
        registry.add_fact(arm, "links", link, &json!({}))?;
    }

    let dump = export_to(&mut registry, arm, &ExportOptions::new().relation_metadata(true))?;
    println!("Exported {} nodes:", dump.len());
    for (uri, node) in &dump {
        println!("  {uri:32} {}", node["classname"]);
    }
    println!();

    let mut copy = robot_registry();
    install_spec_loader(&mut copy, move |uri| dump.get(uri).cloned());
    let arm = copy.load_by_uri("robot://components/arm")?;
    println!("Committed after loading the root: {}", copy.committed_uris().count());
    for fact in copy.get_facts(arm, "links")? {
        println!("  links -> {}", fact.uri().unwrap_or("<unresolved>"));
    }
    println!("Committed after resolving links:  {}", copy.committed_uris().count());
    Ok(())
}
