//! Links between hub instances and tree nodes.
//!
//! The engine keeps the tree node of every materialized instance in the
//! instance's metadata slot. Roots that entered the hub by other means are
//! seeded with [`bind`].

use confhub_hub::Instance;
use confhub_tree::NodeId;
use std::sync::Arc;

/// Metadata stored on an instance that has a tree counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TreeBinding {
    node: NodeId,
}

impl TreeBinding {
    /// Creates a binding to `node`.
    pub fn new(node: NodeId) -> Self {
        Self { node }
    }

    /// Returns the bound node.
    pub fn node(&self) -> NodeId {
        self.node
    }
}

/// Binds an instance to a tree node, replacing any previous metadata.
pub fn bind(instance: &Instance, node: NodeId) {
    instance.set_metadata(Arc::new(TreeBinding::new(node)));
}

/// Returns the binding of an instance.
///
/// `None` when the instance has no metadata or foreign metadata.
pub fn binding(instance: &Instance) -> Option<TreeBinding> {
    instance.metadata_as::<TreeBinding>().map(|b| *b)
}

/// Removes the binding of an instance and returns it.
///
/// Foreign metadata is left in place.
pub fn unbind(instance: &Instance) -> Option<TreeBinding> {
    let bound = binding(instance)?;
    instance.clear_metadata();
    Some(bound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use confhub_hub::PropertyBag;

    #[test]
    fn bind_and_unbind() {
        let instance = Instance::new("/domain", "domain", PropertyBag::new());
        assert_eq!(binding(&instance), None);

        bind(&instance, NodeId(7));
        assert_eq!(binding(&instance).map(|b| b.node()), Some(NodeId(7)));

        assert_eq!(unbind(&instance), Some(TreeBinding::new(NodeId(7))));
        assert!(instance.metadata().is_none());
    }

    #[test]
    fn foreign_metadata_is_not_a_binding() {
        let instance = Instance::new("/domain", "domain", PropertyBag::new());
        instance.set_metadata(Arc::new("something else"));
        assert_eq!(binding(&instance), None);
        assert_eq!(unbind(&instance), None);
        assert!(instance.metadata().is_some());
    }
}
