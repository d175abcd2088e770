//! Error types for entity, registry and serializer operations.

use thiserror::Error;

use crate::relation::Cardinality;
use crate::value::ValueKind;

/// Coarse classification of an [`XTypeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input: unknown names, type mismatches, conflicting definitions.
    InvalidArgument,
    /// A structural contract was breached (cardinality, unknown facts).
    Cardinality,
    /// An identifier could not be resolved to an entity.
    Resolution,
}

/// Errors raised by the object graph.
#[derive(Debug, Error)]
pub enum XTypeError {
    /// The property path has no schema entry.
    #[error("{classname}: property {path} not found")]
    UnknownProperty {
        /// Class of the entity.
        classname: String,
        /// Normalized property path.
        path: String,
    },

    /// The property path already has a schema entry.
    #[error("{classname}: property {path} already defined")]
    PropertyAlreadyDefined {
        /// Class of the entity.
        classname: String,
        /// Normalized property path.
        path: String,
    },

    /// A value does not match the declared property type.
    #[error("{classname}: property {path}: type mismatch, expected {expected}, received {found}")]
    TypeMismatch {
        /// Class of the entity.
        classname: String,
        /// Normalized property path.
        path: String,
        /// Declared type.
        expected: ValueKind,
        /// Type of the rejected value.
        found: ValueKind,
    },

    /// A value is not part of the allowed-value set.
    #[error("{classname}: value {value} not allowed for property {path}")]
    ValueNotAllowed {
        /// Class of the entity.
        classname: String,
        /// Normalized property path.
        path: String,
        /// The rejected value, JSON encoded.
        value: String,
    },

    /// The default value of a schema entry is invalid.
    #[error("invalid default value {value} for {path}")]
    InvalidDefault {
        /// Normalized property path.
        path: String,
        /// The rejected default, JSON encoded.
        value: String,
    },

    /// The relation name has no definition.
    #[error("{classname}: no relation definition found for {name}")]
    UnknownRelation {
        /// Class of the entity.
        classname: String,
        /// Relation attribute name.
        name: String,
    },

    /// A different relation is already defined under the name.
    #[error("{classname}: a different relation for {name} already exists")]
    RelationConflict {
        /// Class of the entity.
        classname: String,
        /// Relation attribute name.
        name: String,
    },

    /// The relation is already defined with the opposite direction.
    #[error("{classname}: a different relation direction has already been defined for {name}")]
    DirectionConflict {
        /// Class of the entity.
        classname: String,
        /// Relation attribute name.
        name: String,
    },

    /// The fact target is absent or no longer alive.
    #[error("{classname}: invalid target for fact of {name}")]
    InvalidTarget {
        /// Class of the source entity.
        classname: String,
        /// Relation attribute name.
        name: String,
    },

    /// Adding a fact would break the cardinality constraint.
    #[error("{classname}: cardinality constraint {cardinality} on {name} does not allow adding another fact")]
    CardinalityViolation {
        /// Class of the source entity.
        classname: String,
        /// Relation attribute name.
        name: String,
        /// Direction-adjusted cardinality that was violated.
        cardinality: Cardinality,
    },

    /// The facts of a relation are still unknown.
    #[error("{classname}: facts of {name} are unknown")]
    FactsUnknown {
        /// Class of the entity.
        classname: String,
        /// Relation attribute name.
        name: String,
    },

    /// A deferred fact carries no identifier to resolve.
    #[error("{classname}: deferred fact of {name} has no target identifier")]
    UnresolvableFact {
        /// Class of the entity.
        classname: String,
        /// Relation attribute name.
        name: String,
    },

    /// The classname is not registered.
    #[error("class {0} is not registered")]
    UnknownClass(String),

    /// The classname is already registered.
    #[error("class {0} is already registered")]
    ClassAlreadyRegistered(String),

    /// The handle does not refer to a live working instance.
    #[error("no live entity behind handle {0}")]
    UnknownEntity(String),

    /// The handle was issued by a different registry.
    #[error("handle {0} belongs to another registry")]
    ForeignEntity(String),

    /// The entity identifier cannot currently be computed.
    #[error("{classname}: identifier is not valid yet")]
    InvalidUri {
        /// Class of the entity.
        classname: String,
    },

    /// Neither the registry nor its loader know the identifier.
    #[error("{0} could not be found")]
    NotFound(String),

    /// The loader returned an entity with a different identifier.
    #[error("identifier mismatch: requested {requested}, loaded {loaded}")]
    UriMismatch {
        /// The requested identifier.
        requested: String,
        /// The identifier of the loaded entity.
        loaded: String,
    },

    /// A required field is missing in a node spec.
    #[error("missing field {field} in node spec")]
    MissingField {
        /// Name of the field.
        field: &'static str,
    },

    /// A node spec is malformed.
    #[error("invalid node spec: {0}")]
    InvalidSpec(String),

    /// The external loader failed.
    #[error("loader failed for {uri}: {reason}")]
    Load {
        /// Identifier being loaded.
        uri: String,
        /// Failure description.
        reason: String,
    },
}

impl XTypeError {
    /// Returns the taxonomy class of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            XTypeError::CardinalityViolation { .. } | XTypeError::FactsUnknown { .. } => {
                ErrorKind::Cardinality
            }
            XTypeError::InvalidUri { .. }
            | XTypeError::UnresolvableFact { .. }
            | XTypeError::NotFound(_)
            | XTypeError::UriMismatch { .. }
            | XTypeError::MissingField { .. }
            | XTypeError::InvalidSpec(_)
            | XTypeError::Load { .. } => ErrorKind::Resolution,
            _ => ErrorKind::InvalidArgument,
        }
    }

    /// Fills the classname of schema errors raised outside an entity.
    pub(crate) fn for_class(mut self, owner: &str) -> Self {
        match &mut self {
            XTypeError::PropertyAlreadyDefined { classname, .. }
            | XTypeError::TypeMismatch { classname, .. }
            | XTypeError::ValueNotAllowed { classname, .. }
                if classname.is_empty() =>
            {
                owner.clone_into(classname);
            }
            _ => {}
        }
        self
    }
}

/// Result type for object graph operations.
pub type Result<T> = std::result::Result<T, XTypeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        let err = XTypeError::UnknownProperty {
            classname: "Component".into(),
            path: "/name".into(),
        };
        assert_eq!(err.to_string(), "Component: property /name not found");

        let err = XTypeError::CardinalityViolation {
            classname: "Component".into(),
            name: "parent".into(),
            cardinality: Cardinality::ManyToOne,
        };
        assert_eq!(
            err.to_string(),
            "Component: cardinality constraint MANY2ONE on parent does not allow adding another fact"
        );
    }

    #[test]
    fn taxonomy() {
        assert_eq!(
            XTypeError::UnknownClass("X".into()).kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            XTypeError::FactsUnknown {
                classname: "X".into(),
                name: "r".into()
            }
            .kind(),
            ErrorKind::Cardinality
        );
        assert_eq!(XTypeError::NotFound("x://y".into()).kind(), ErrorKind::Resolution);
    }
}
