//! Validation hooks that can veto tree mutations.

use crate::node::Node;
use std::collections::BTreeMap;

/// A mutation about to be staged in a transaction.
#[derive(Debug, Clone, Copy)]
pub enum ProposedChange<'a> {
    /// Setting (or removing, when `new_value` is `None`) an attribute.
    SetAttribute {
        /// Node being written.
        node: &'a Node,
        /// Xml name of the attribute.
        attribute: &'a str,
        /// Value that will be replaced.
        old_value: Option<&'a str>,
        /// Value being written.
        new_value: Option<&'a str>,
    },
    /// Adding a child with initial attributes.
    AddChild {
        /// Parent node.
        parent: &'a Node,
        /// Element name of the new child.
        element: &'a str,
        /// Type of the new child.
        child_type: &'a str,
        /// Initial attributes.
        attributes: &'a BTreeMap<String, String>,
    },
    /// Deleting a child and its subtree.
    DeleteChild {
        /// Parent node.
        parent: &'a Node,
        /// Child being removed.
        child: &'a Node,
    },
}

/// Application-level constraint checked before each mutation.
///
/// Returning `Err(reason)` vetoes only that mutation; the surrounding
/// transaction may still commit its other mutations.
pub trait Validator: Send + Sync {
    /// Checks a proposed change.
    fn validate(&self, change: &ProposedChange<'_>) -> Result<(), String>;
}

impl<F> Validator for F
where
    F: Fn(&ProposedChange<'_>) -> Result<(), String> + Send + Sync,
{
    fn validate(&self, change: &ProposedChange<'_>) -> Result<(), String> {
        self(change)
    }
}
