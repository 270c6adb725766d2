//! Error types for the writeback engine.

use confhub_tree::{NodeId, TreeError};
use thiserror::Error;

/// Result type for writeback operations.
pub type WritebackResult<T> = Result<T, WritebackError>;

/// Errors raised while propagating a single change.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WritebackError {
    /// The parent of an added instance is not in the proposed hub.
    #[error("parent {parent_key} of type {parent_type} not found for {instance_key}")]
    MissingParent {
        /// Type name of the expected parent.
        parent_type: String,
        /// Instance key of the expected parent.
        parent_key: String,
        /// Key of the instance being added.
        instance_key: String,
    },

    /// A root instance was added; roots are bound, not created.
    #[error("root instance {instance_key} of type {type_name} has no parent to attach to")]
    RootAdd {
        /// Type name of the instance.
        type_name: String,
        /// Instance key.
        instance_key: String,
    },

    /// The instance carries no tree binding.
    #[error("instance {instance_key} of type {type_name} has no tree binding")]
    MissingMetadata {
        /// Type name of the instance.
        type_name: String,
        /// Instance key.
        instance_key: String,
    },

    /// The binding does not point at a live tree node.
    #[error("instance {instance_key} of type {type_name} is not bound to a live tree node{}", .node.map(|n| format!(" ({n})")).unwrap_or_default())]
    MissingTreeNode {
        /// Type name of the instance.
        type_name: String,
        /// Instance key.
        instance_key: String,
        /// Stale node, when the binding names one.
        node: Option<NodeId>,
    },

    /// Type name and instance key do not encode a valid path.
    #[error("malformed path {type_name:?} / {instance_key:?}: {reason}")]
    MalformedPath {
        /// Type name as received.
        type_name: String,
        /// Instance key as received.
        instance_key: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Several wildcard slots accept the same element.
    #[error("{parent_type} has {count} wildcard slots accepting element {element}")]
    AmbiguousSlot {
        /// Type of the parent node.
        parent_type: String,
        /// Element name being resolved.
        element: String,
        /// Number of matching slots.
        count: usize,
    },

    /// No slot of the parent accepts the element.
    #[error("{parent_type} has no slot for element {element}")]
    NoSlot {
        /// Type of the parent node.
        parent_type: String,
        /// Element name being resolved.
        element: String,
    },

    /// The tree refused the mutation.
    #[error("tree apply failed: {0}")]
    Apply(#[from] TreeError),
}

impl WritebackError {
    /// Creates a malformed path error.
    pub fn malformed(type_name: &str, instance_key: &str, reason: impl Into<String>) -> Self {
        Self::MalformedPath {
            type_name: type_name.to_string(),
            instance_key: instance_key.to_string(),
            reason: reason.into(),
        }
    }

    /// Creates a missing metadata error.
    pub fn missing_metadata(type_name: &str, instance_key: &str) -> Self {
        Self::MissingMetadata {
            type_name: type_name.to_string(),
            instance_key: instance_key.to_string(),
        }
    }

    /// Creates a missing tree node error.
    pub fn missing_tree_node(type_name: &str, instance_key: &str, node: Option<NodeId>) -> Self {
        Self::MissingTreeNode {
            type_name: type_name.to_string(),
            instance_key: instance_key.to_string(),
            node,
        }
    }

    /// Returns true for precondition violations.
    ///
    /// These mean hub and tree disagree on structure; retrying the same
    /// change cannot succeed.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, WritebackError::Apply(_))
    }

    /// Returns true if the tree rejected the value rather than the structure.
    pub fn is_rejection(&self) -> bool {
        matches!(self, WritebackError::Apply(e) if e.is_rejection())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let err = WritebackError::missing_metadata("/domain", "domain");
        assert!(err.is_fatal());
        assert!(!err.is_rejection());

        let err = WritebackError::from(TreeError::vetoed("read only"));
        assert!(!err.is_fatal());
        assert!(err.is_rejection());

        let err = WritebackError::from(TreeError::NodeNotFound { id: NodeId(9) });
        assert!(!err.is_fatal());
        assert!(!err.is_rejection());
    }

    #[test]
    fn display() {
        let err = WritebackError::missing_tree_node("/domain", "domain", Some(NodeId(4)));
        assert_eq!(
            err.to_string(),
            "instance domain of type /domain is not bound to a live tree node (node:4)"
        );
        let err = WritebackError::missing_tree_node("/domain", "domain", None);
        assert_eq!(
            err.to_string(),
            "instance domain of type /domain is not bound to a live tree node"
        );
    }
}
