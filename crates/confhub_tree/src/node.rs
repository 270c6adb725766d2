//! Tree nodes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identity of a node in a config tree.
///
/// Ids are allocated monotonically and never reused within one tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl NodeId {
    /// Returns the raw id.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node:{}", self.0)
    }
}

/// A node of the config tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) type_name: String,
    pub(crate) element_name: String,
    pub(crate) parent: Option<NodeId>,
    pub(crate) key_attribute: Option<String>,
    pub(crate) attributes: BTreeMap<String, String>,
    pub(crate) children: Vec<NodeId>,
}

impl Node {
    /// Returns the node id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Returns the schema type of the node.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Returns the element name the node is stored under.
    pub fn element_name(&self) -> &str {
        &self.element_name
    }

    /// Returns the parent, or `None` for roots.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Returns true for root nodes.
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Returns all attributes keyed by xml name.
    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    /// Returns one attribute.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Returns the stable key used to find the node in a list slot.
    pub fn key(&self) -> Option<&str> {
        self.key_attribute
            .as_deref()
            .and_then(|k| self.attribute(k))
    }

    /// Returns the children in insertion order.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}
