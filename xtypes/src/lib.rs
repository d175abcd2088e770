//! Schema-checked typed object graph.
//!
//! The `xtypes` crate models a graph of typed entities. Every entity carries
//! properties validated against a per-class schema and takes part in typed,
//! cardinality-constrained relations whose facts (edges) may be resolved
//! lazily by identifier. A [`Registry`] owns all entities: it constructs
//! them from registered classes, separates working copies from committed
//! entities, and resolves unknown identifiers through an injected loader.
//! The [`serializer`] moves graphs to and from a JSON wire format.
//!
//! # Entry Point
//!
//! ```
//! use serde_json::json;
//! use xtypes::{Entity, EntityClass, PropertySchema, Registry, RelationKind, UriTemplate, ValueKind};
//!
//! struct Joint;
//!
//! impl EntityClass for Joint {
//!     const CLASSNAME: &'static str = "Joint";
//!
//!     fn construct() -> Entity {
//!         let mut joint = Entity::new(Self::CLASSNAME)
//!             .with_uri_template(UriTemplate::new("robot", "joints").property("name", true));
//!         joint
//!             .define_property("name", ValueKind::String, vec![], json!(""), false)
//!             .expect("fresh schema");
//!         joint
//!             .define_preset("next", RelationKind::ConnectedTo, ["Joint"], PropertySchema::new(), false, false)
//!             .expect("fresh relation");
//!         joint
//!     }
//! }
//!
//! let mut registry = Registry::new();
//! registry.register_class::<Joint>();
//!
//! let hip = registry.instantiate::<Joint>()?;
//! registry.entity_mut(hip)?.set_property("name", json!("hip"), true)?;
//! let knee = registry.instantiate::<Joint>()?;
//! registry.entity_mut(knee)?.set_property("name", json!("knee"), true)?;
//! registry.add_fact(hip, "next", knee, &json!({}))?;
//!
//! let dump = xtypes::serializer::export_to(&mut registry, hip, &Default::default())?;
//! assert_eq!(dump.len(), 2);
//! assert!(registry.knows_uri("robot://joints/knee"));
//! # Ok::<(), xtypes::XTypeError>(())
//! ```
//!
//! # Working copies
//!
//! Handles returned by [`Registry::instantiate_from`] and
//! [`Registry::get_by_uri`] address *working copies*. Edits never reach the
//! committed entity until [`Registry::commit`] is called, and committing
//! never touches other working copies.

#![deny(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    missing_docs,
    clippy::missing_errors_doc
)]

pub mod entity;
pub mod error;
pub mod fact;
mod facts;
pub mod registry;
pub mod relation;
pub mod schema;
pub mod serializer;
pub mod uri;
pub mod value;

pub use entity::{Entity, BASE_CLASSNAME};
pub use error::{ErrorKind, Result, XTypeError};
pub use fact::Fact;
pub use registry::{EntityClass, EntityId, Factory, LoadFunc, Registry, RegistryId};
pub use relation::{Cardinality, DeletePolicy, Preset, Relation, RelationKind, PRESETS};
pub use schema::{PropertyDef, PropertySchema};
pub use serializer::ExportOptions;
pub use uri::{uri_to_uuid, UriPart, UriTemplate};
pub use value::ValueKind;
