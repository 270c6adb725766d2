//! Events emitted by committed tree transactions.

use crate::node::NodeId;

/// One committed mutation of the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeEvent {
    /// An attribute was set, changed or removed.
    AttributeChanged {
        /// Node that owns the attribute.
        node: NodeId,
        /// Element name of that node.
        element: String,
        /// Xml name of the attribute.
        attribute: String,
        /// Previous value.
        old_value: Option<String>,
        /// New value.
        new_value: Option<String>,
    },
    /// A child was added.
    ChildAdded {
        /// Parent node.
        parent: NodeId,
        /// New child.
        child: NodeId,
        /// Element name of the child.
        element: String,
    },
    /// A child (and its subtree) was removed.
    ChildRemoved {
        /// Parent node.
        parent: NodeId,
        /// Removed child.
        child: NodeId,
        /// Element name of the child.
        element: String,
    },
    /// A root was created.
    RootAdded {
        /// The root.
        node: NodeId,
        /// Element name of the root.
        element: String,
    },
    /// A root (and its subtree) was released.
    RootReleased {
        /// The root.
        node: NodeId,
        /// Element name of the root.
        element: String,
    },
}

impl TreeEvent {
    /// Returns the attribute name for attribute events, the element name otherwise.
    pub fn name(&self) -> &str {
        match self {
            TreeEvent::AttributeChanged { attribute, .. } => attribute,
            TreeEvent::ChildAdded { element, .. }
            | TreeEvent::ChildRemoved { element, .. }
            | TreeEvent::RootAdded { element, .. }
            | TreeEvent::RootReleased { element, .. } => element,
        }
    }

    /// Returns true for events that add or remove nodes.
    pub fn is_structural(&self) -> bool {
        !matches!(self, TreeEvent::AttributeChanged { .. })
    }
}

/// Observer of committed tree transactions.
///
/// Called on the committing thread after the tree's write lock has been
/// released, once per transaction with all of its events in order.
pub trait TreeListener: Send + Sync {
    /// Handles the events of one committed transaction.
    fn tree_changed(&self, events: &[TreeEvent]);
}

impl<F> TreeListener for F
where
    F: Fn(&[TreeEvent]) + Send + Sync,
{
    fn tree_changed(&self, events: &[TreeEvent]) {
        self(events)
    }
}
