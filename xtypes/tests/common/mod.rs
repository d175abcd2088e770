//! Shared test model: components owning links.

#![allow(dead_code)]

use serde_json::json;
use xtypes::{
    Entity, EntityClass, EntityId, PropertySchema, Registry, RelationKind, UriTemplate, ValueKind,
};

pub struct Component;

impl EntityClass for Component {
    const CLASSNAME: &'static str = "robot::Component";

    fn construct() -> Entity {
        let mut entity = Entity::new(Self::CLASSNAME)
            .with_uri_template(UriTemplate::new("robot", "components").property("name", true));
        entity
            .define_property("name", ValueKind::String, vec![], json!(""), false)
            .expect("name");
        entity
            .define_property(
                "direction",
                ValueKind::String,
                vec![json!("in"), json!("out")],
                json!("out"),
                false,
            )
            .expect("direction");
        entity
            .define_property("mass", ValueKind::Float, vec![], json!(0.0), false)
            .expect("mass");
        entity
            .define_property("limits/max", ValueKind::Integer, vec![], json!(10), false)
            .expect("limits");
        entity
            .define_preset("links", RelationKind::Has, [Link::CLASSNAME], weight(), false, false)
            .expect("links");
        entity
            .define_preset("conn", RelationKind::ConnectedTo, [Self::CLASSNAME], weight(), false, false)
            .expect("conn");
        entity
            .define_preset("alias", RelationKind::AliasOf, [Self::CLASSNAME], PropertySchema::new(), false, false)
            .expect("alias");
        entity
    }
}

pub struct Link;

impl EntityClass for Link {
    const CLASSNAME: &'static str = "robot::Link";

    fn construct() -> Entity {
        let mut entity = Entity::new(Self::CLASSNAME)
            .with_uri_template(UriTemplate::new("robot", "links").property("name", true));
        entity
            .define_property("name", ValueKind::String, vec![], json!(""), false)
            .expect("name");
        entity
            .define_preset("owner", RelationKind::Has, [Component::CLASSNAME], weight(), true, false)
            .expect("owner");
        entity
    }
}

pub fn weight() -> PropertySchema {
    PropertySchema::new()
        .with("weight", ValueKind::Integer, vec![], json!(1))
        .expect("weight")
}

pub fn registry() -> Registry {
    let mut registry = Registry::new();
    registry.register_class::<Component>();
    registry.register_class::<Link>();
    registry
}

pub fn spawn<T: EntityClass>(registry: &mut Registry, name: &str) -> EntityId {
    let id = registry.instantiate::<T>().expect("registered");
    registry
        .entity_mut(id)
        .and_then(|e| e.set_property("name", json!(name), true))
        .expect("name");
    id
}
