//! Error types for the config tree.

use crate::node::NodeId;
use crate::schema::AttributeKind;
use thiserror::Error;

/// Result type for tree operations.
pub type TreeResult<T> = Result<T, TreeError>;

/// Errors raised by tree reads and transactional mutations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TreeError {
    /// Node does not exist.
    #[error("node not found: {id}")]
    NodeNotFound {
        /// The missing node.
        id: NodeId,
    },

    /// Type is not part of the schema.
    #[error("unknown node type: {type_name}")]
    UnknownType {
        /// The unknown type.
        type_name: String,
    },

    /// Parent has no slot accepting the child.
    #[error("{parent_type} has no slot for element {element} of type {child_type}")]
    NoSuchSlot {
        /// Type of the parent node.
        parent_type: String,
        /// Requested element name.
        element: String,
        /// Requested child type.
        child_type: String,
    },

    /// Single-valued slot already holds a child.
    #[error("slot {element} of {parent} is already occupied")]
    SlotOccupied {
        /// Parent node.
        parent: NodeId,
        /// Element name of the slot.
        element: String,
    },

    /// Node is not a direct child of the given parent.
    #[error("{child} is not a child of {parent}")]
    NotAChild {
        /// Expected parent.
        parent: NodeId,
        /// Offending child.
        child: NodeId,
    },

    /// Node has a parent and cannot be released as a root.
    #[error("{node} is not a root")]
    NotARoot {
        /// Offending node.
        node: NodeId,
    },

    /// Attribute is not declared by the node's type.
    #[error("{type_name} has no attribute {attribute}")]
    UnknownAttribute {
        /// Type of the node.
        type_name: String,
        /// Attribute name.
        attribute: String,
    },

    /// Attribute value does not match its declared kind.
    #[error("invalid value {value:?} for {kind:?} attribute {attribute}")]
    InvalidValue {
        /// Attribute name.
        attribute: String,
        /// Rejected value.
        value: String,
        /// Declared kind.
        kind: AttributeKind,
    },

    /// Required attribute is missing or being removed.
    #[error("{type_name} requires attribute {attribute}")]
    MissingAttribute {
        /// Type of the node.
        type_name: String,
        /// Attribute name.
        attribute: String,
    },

    /// Sibling with the same key already exists.
    #[error("duplicate key {key:?} under element {element}")]
    DuplicateKey {
        /// Element name of the siblings.
        element: String,
        /// Conflicting key.
        key: String,
    },

    /// A validator vetoed the change.
    #[error("change vetoed: {reason}")]
    Vetoed {
        /// Reason given by the validator.
        reason: String,
    },

    /// Transaction was aborted by its body.
    #[error("transaction aborted: {reason}")]
    Aborted {
        /// Reason for abort.
        reason: String,
    },
}

impl TreeError {
    /// Creates a veto error.
    pub fn vetoed(reason: impl Into<String>) -> Self {
        Self::Vetoed {
            reason: reason.into(),
        }
    }

    /// Creates a transaction aborted error.
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::Aborted {
            reason: reason.into(),
        }
    }

    /// Returns true if the error is a validation rejection rather than a
    /// structural failure.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            TreeError::Vetoed { .. }
                | TreeError::InvalidValue { .. }
                | TreeError::MissingAttribute { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_classification() {
        assert!(TreeError::vetoed("no").is_rejection());
        assert!(TreeError::InvalidValue {
            attribute: "port".into(),
            value: "x".into(),
            kind: AttributeKind::Int,
        }
        .is_rejection());
        assert!(!TreeError::NodeNotFound { id: NodeId(3) }.is_rejection());
        assert!(!TreeError::aborted("boom").is_rejection());
    }

    #[test]
    fn error_display() {
        let err = TreeError::NotAChild {
            parent: NodeId(1),
            child: NodeId(2),
        };
        assert_eq!(err.to_string(), "node:2 is not a child of node:1");
    }
}
