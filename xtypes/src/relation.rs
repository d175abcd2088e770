//! Relation definitions: kind, endpoint classes, cardinality and delete policy.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::schema::PropertySchema;

/// Semantic kind of a relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationKind {
    /// Ownership of parts.
    Has,
    /// Composition part pointing to its whole.
    PartOfComposition,
    /// Specialization of another class.
    SubclassOf,
    /// Instance of a model.
    InstanceOf,
    /// Symmetric connection.
    ConnectedTo,
    /// Alias of another entity.
    AliasOf,
    /// Requirement of a capability.
    Needs,
    /// Provision of a capability.
    Provides,
    /// Containment.
    ContainedBy,
    /// Existence in a context.
    ExistsIn,
    /// Generated artifact.
    Generated,
    /// Dependency.
    DependsOn,
    /// Constraint.
    ConstrainedBy,
    /// Interface attachment.
    InterfaceTo,
    /// Spanning.
    Spans,
    /// Unique ownership.
    HasUnique,
    /// Annotation.
    Annotates,
    /// Attachment.
    AttachedTo,
    /// Sampling capability.
    CanSample,
    /// Conditioning.
    ConditionableOn,
    /// Interface implementation.
    Implements,
    /// Configuration target.
    ConfiguredFor,
}

impl RelationKind {
    /// Every kind, in declaration order.
    pub const ALL: [RelationKind; 22] = [
        RelationKind::Has,
        RelationKind::PartOfComposition,
        RelationKind::SubclassOf,
        RelationKind::InstanceOf,
        RelationKind::ConnectedTo,
        RelationKind::AliasOf,
        RelationKind::Needs,
        RelationKind::Provides,
        RelationKind::ContainedBy,
        RelationKind::ExistsIn,
        RelationKind::Generated,
        RelationKind::DependsOn,
        RelationKind::ConstrainedBy,
        RelationKind::InterfaceTo,
        RelationKind::Spans,
        RelationKind::HasUnique,
        RelationKind::Annotates,
        RelationKind::AttachedTo,
        RelationKind::CanSample,
        RelationKind::ConditionableOn,
        RelationKind::Implements,
        RelationKind::ConfiguredFor,
    ];

    /// Returns the wire name (e.g. `"PART_OF_COMPOSITION"`).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RelationKind::Has => "HAS",
            RelationKind::PartOfComposition => "PART_OF_COMPOSITION",
            RelationKind::SubclassOf => "SUBCLASS_OF",
            RelationKind::InstanceOf => "INSTANCE_OF",
            RelationKind::ConnectedTo => "CONNECTED_TO",
            RelationKind::AliasOf => "ALIAS_OF",
            RelationKind::Needs => "NEEDS",
            RelationKind::Provides => "PROVIDES",
            RelationKind::ContainedBy => "CONTAINED_BY",
            RelationKind::ExistsIn => "EXISTS_IN",
            RelationKind::Generated => "GENERATED",
            RelationKind::DependsOn => "DEPENDS_ON",
            RelationKind::ConstrainedBy => "CONSTRAINED_BY",
            RelationKind::InterfaceTo => "INTERFACE_TO",
            RelationKind::Spans => "SPANS",
            RelationKind::HasUnique => "HAS_UNIQUE",
            RelationKind::Annotates => "ANNOTATES",
            RelationKind::AttachedTo => "ATTACHED_TO",
            RelationKind::CanSample => "CAN_SAMPLE",
            RelationKind::ConditionableOn => "CONDITIONABLE_ON",
            RelationKind::Implements => "IMPLEMENTS",
            RelationKind::ConfiguredFor => "CONFIGURED_FOR",
        }
    }

    /// Returns the fixed preset of this kind.
    #[must_use]
    pub fn preset(self) -> &'static Preset {
        // PRESETS is declared in RelationKind::ALL order.
        &PRESETS[self as usize]
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cardinality constraint between the from side and the to side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cardinality {
    /// Unconstrained.
    #[serde(rename = "MANY2MANY")]
    ManyToMany,
    /// One source, many targets.
    #[serde(rename = "ONE2MANY")]
    OneToMany,
    /// Many sources, one target.
    #[serde(rename = "MANY2ONE")]
    ManyToOne,
    /// One source, one target.
    #[serde(rename = "ONE2ONE")]
    OneToOne,
}

impl Cardinality {
    /// Swaps one-to-many and many-to-one.
    ///
    /// Used when an attribute stores the inverse side of a relation.
    #[must_use]
    pub fn inverted(self) -> Self {
        match self {
            Cardinality::OneToMany => Cardinality::ManyToOne,
            Cardinality::ManyToOne => Cardinality::OneToMany,
            other => other,
        }
    }

    /// Checks whether an attribute holding `existing` facts may take another.
    #[must_use]
    pub fn allows_another(self, existing: usize) -> bool {
        match self {
            Cardinality::ManyToOne | Cardinality::OneToOne => existing == 0,
            Cardinality::ManyToMany | Cardinality::OneToMany => true,
        }
    }

    /// Returns the wire name (e.g. `"ONE2MANY"`).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Cardinality::ManyToMany => "MANY2MANY",
            Cardinality::OneToMany => "ONE2MANY",
            Cardinality::ManyToOne => "MANY2ONE",
            Cardinality::OneToOne => "ONE2ONE",
        }
    }
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Advisory cascade hint. Not enforced by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeletePolicy {
    /// Nothing is deleted.
    #[serde(rename = "DELETENONE")]
    None,
    /// Deleting the target deletes the source.
    #[serde(rename = "DELETESOURCE")]
    Source,
    /// Deleting the source deletes the target.
    #[serde(rename = "DELETETARGET")]
    Target,
    /// Both directions cascade.
    #[serde(rename = "DELETEBOTH")]
    Both,
}

impl DeletePolicy {
    /// Returns the wire name (e.g. `"DELETETARGET"`).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DeletePolicy::None => "DELETENONE",
            DeletePolicy::Source => "DELETESOURCE",
            DeletePolicy::Target => "DELETETARGET",
            DeletePolicy::Both => "DELETEBOTH",
        }
    }
}

impl fmt::Display for DeletePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed parameters of a named relation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preset {
    /// The kind this preset belongs to.
    pub kind: RelationKind,
    /// Cardinality on the forward side.
    pub cardinality: Cardinality,
    /// Delete policy.
    pub delete_policy: DeletePolicy,
    /// Kind this one specializes.
    pub super_kind: Option<RelationKind>,
}

const fn preset(
    kind: RelationKind,
    cardinality: Cardinality,
    delete_policy: DeletePolicy,
    super_kind: Option<RelationKind>,
) -> Preset {
    Preset {
        kind,
        cardinality,
        delete_policy,
        super_kind,
    }
}

/// Presets of every relation kind, in [`RelationKind::ALL`] order.
pub static PRESETS: [Preset; 22] = {
    use Cardinality::*;
    use RelationKind as K;
    [
        preset(K::Has, OneToMany, DeletePolicy::Target, None),
        preset(K::PartOfComposition, ManyToOne, DeletePolicy::Source, None),
        preset(K::SubclassOf, ManyToMany, DeletePolicy::None, None),
        preset(K::InstanceOf, ManyToOne, DeletePolicy::Source, None),
        preset(K::ConnectedTo, ManyToMany, DeletePolicy::None, None),
        preset(K::AliasOf, OneToOne, DeletePolicy::None, None),
        preset(K::Needs, OneToMany, DeletePolicy::Target, Some(K::Has)),
        preset(K::Provides, OneToMany, DeletePolicy::Target, Some(K::Has)),
        preset(K::ContainedBy, ManyToMany, DeletePolicy::None, None),
        preset(K::ExistsIn, ManyToOne, DeletePolicy::Source, None),
        preset(K::Generated, OneToMany, DeletePolicy::None, None),
        preset(K::DependsOn, ManyToMany, DeletePolicy::Source, None),
        preset(K::ConstrainedBy, ManyToMany, DeletePolicy::Source, None),
        preset(K::InterfaceTo, ManyToOne, DeletePolicy::Source, None),
        preset(K::Spans, ManyToMany, DeletePolicy::Target, None),
        preset(K::HasUnique, OneToOne, DeletePolicy::None, None),
        preset(K::Annotates, ManyToMany, DeletePolicy::None, None),
        preset(K::AttachedTo, ManyToOne, DeletePolicy::Source, None),
        preset(K::CanSample, ManyToMany, DeletePolicy::Source, None),
        preset(K::ConditionableOn, ManyToMany, DeletePolicy::Source, None),
        preset(K::Implements, ManyToMany, DeletePolicy::None, None),
        preset(K::ConfiguredFor, ManyToMany, DeletePolicy::Source, None),
    ]
};

/// A named edge kind between classes.
#[derive(Debug, Clone)]
pub struct Relation {
    /// Semantic kind.
    pub kind: RelationKind,
    /// Kind this relation specializes.
    pub super_kind: Option<RelationKind>,
    /// Classnames permitted on the from side.
    pub from_classnames: BTreeSet<String>,
    /// Classnames permitted on the to side.
    pub to_classnames: BTreeSet<String>,
    /// Cardinality constraint.
    pub cardinality: Cardinality,
    /// Advisory delete policy.
    pub delete_policy: DeletePolicy,
    /// Template of the properties stored on each edge.
    pub edge_template: PropertySchema,
}

impl Relation {
    /// Creates a many-to-many relation without delete policy.
    pub fn new<F, T, S1, S2>(kind: RelationKind, from: F, to: T) -> Self
    where
        F: IntoIterator<Item = S1>,
        T: IntoIterator<Item = S2>,
        S1: Into<String>,
        S2: Into<String>,
    {
        Self {
            kind,
            super_kind: None,
            from_classnames: from.into_iter().map(Into::into).collect(),
            to_classnames: to.into_iter().map(Into::into).collect(),
            cardinality: Cardinality::ManyToMany,
            delete_policy: DeletePolicy::None,
            edge_template: PropertySchema::new(),
        }
    }

    /// Creates a relation with the preset parameters of `kind`.
    pub fn from_preset<F, T, S1, S2>(kind: RelationKind, from: F, to: T) -> Self
    where
        F: IntoIterator<Item = S1>,
        T: IntoIterator<Item = S2>,
        S1: Into<String>,
        S2: Into<String>,
    {
        let preset = kind.preset();
        Self::new(kind, from, to)
            .with_cardinality(preset.cardinality)
            .with_delete_policy(preset.delete_policy)
            .with_super_kind(preset.super_kind)
    }

    /// Sets the cardinality constraint.
    #[must_use]
    pub fn with_cardinality(mut self, cardinality: Cardinality) -> Self {
        self.cardinality = cardinality;
        self
    }

    /// Sets the delete policy.
    #[must_use]
    pub fn with_delete_policy(mut self, delete_policy: DeletePolicy) -> Self {
        self.delete_policy = delete_policy;
        self
    }

    /// Sets the super kind.
    #[must_use]
    pub fn with_super_kind(mut self, super_kind: Option<RelationKind>) -> Self {
        self.super_kind = super_kind;
        self
    }

    /// Sets the edge-property template.
    #[must_use]
    pub fn with_edge_template(mut self, edge_template: PropertySchema) -> Self {
        self.edge_template = edge_template;
        self
    }

    /// Returns the same relation seen from the other side.
    #[must_use]
    pub fn swapped(mut self) -> Self {
        std::mem::swap(&mut self.from_classnames, &mut self.to_classnames);
        self
    }

    /// Describes the relation as JSON.
    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({
            "relation_type": self.kind,
            "subrelation_of": self.super_kind,
            "from_classnames": self.from_classnames,
            "to_classnames": self.to_classnames,
            "constraint": self.cardinality,
            "delete_policy": self.delete_policy,
            "property_schema": self.edge_template.to_json()
        })
    }
}

fn nested(a: &BTreeSet<String>, b: &BTreeSet<String>) -> bool {
    a.is_subset(b) || b.is_subset(a)
}

/// Structural equality.
///
/// Endpoint class sets compare equal when one contains the other. The edge
/// template is not compared.
impl PartialEq for Relation {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.super_kind == other.super_kind
            && nested(&self.from_classnames, &other.from_classnames)
            && nested(&self.to_classnames, &other.to_classnames)
            && self.cardinality == other.cardinality
            && self.delete_policy == other.delete_policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_follow_kind_order() {
        for kind in RelationKind::ALL {
            assert_eq!(kind.preset().kind, kind, "preset table out of order at {kind}");
        }
    }

    #[test]
    fn needs_and_provides_specialize_has() {
        assert_eq!(RelationKind::Needs.preset().super_kind, Some(RelationKind::Has));
        assert_eq!(RelationKind::Provides.preset().super_kind, Some(RelationKind::Has));
        assert_eq!(RelationKind::Has.preset().super_kind, None);
    }

    #[test]
    fn cardinality_inversion() {
        assert_eq!(Cardinality::OneToMany.inverted(), Cardinality::ManyToOne);
        assert_eq!(Cardinality::ManyToOne.inverted(), Cardinality::OneToMany);
        assert_eq!(Cardinality::OneToOne.inverted(), Cardinality::OneToOne);
        assert!(!Cardinality::OneToOne.allows_another(1));
        assert!(Cardinality::OneToMany.allows_another(5));
    }

    #[test]
    fn equality_accepts_nested_class_sets() {
        let narrow = Relation::from_preset(RelationKind::Has, ["Robot"], ["Link"]);
        let wide = Relation::from_preset(RelationKind::Has, ["Robot"], ["Link", "Joint"]);
        assert_eq!(narrow, wide);
        let disjoint = Relation::from_preset(RelationKind::Has, ["Robot"], ["Sensor"]);
        assert_ne!(narrow, disjoint);
        let other_policy = narrow.clone().with_delete_policy(DeletePolicy::Both);
        assert_ne!(narrow, other_policy);
    }

    #[test]
    fn wire_names() {
        assert_eq!(
            serde_json::to_value(RelationKind::PartOfComposition).ok(),
            Some(json!("PART_OF_COMPOSITION"))
        );
        assert_eq!(serde_json::to_value(Cardinality::OneToMany).ok(), Some(json!("ONE2MANY")));
        assert_eq!(serde_json::to_value(DeletePolicy::Target).ok(), Some(json!("DELETETARGET")));
        let json = Relation::from_preset(RelationKind::Needs, ["A"], ["B"]).to_json();
        assert_eq!(json["subrelation_of"], json!("HAS"));
        assert_eq!(json["constraint"], json!("ONE2MANY"));
    }
}
