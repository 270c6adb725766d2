//! Tree-to-hub mirroring of attribute edits.

use crate::binding::binding;
use crate::config::WritebackConfig;
use confhub_hub::{CommitOrigin, Hub, HubSnapshot, Instance, PropertyBag, Value};
use confhub_tree::{AttributeKind, ConfigTree, NodeId, TreeEvent, TreeListener, PROPERTY_TYPE};
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use tracing::{debug, trace, warn};

/// Commits attribute edits made directly in the tree back into the hub.
///
/// Commits carry [`CommitOrigin::TreeIntegration`] so the writeback engine
/// ignores them. Install it behind an [`EchoFilter`](crate::EchoFilter) so
/// the engine's own writes are not mirrored. Structural edits (added or
/// removed nodes) are not mirrored.
pub struct TreeToHubMirror {
    hub: Weak<Hub>,
    tree: Weak<ConfigTree>,
    config: WritebackConfig,
}

type InstanceId = (String, String);

impl TreeToHubMirror {
    /// Creates a mirror with default settings.
    pub fn new(hub: &Arc<Hub>, tree: &Arc<ConfigTree>) -> Self {
        Self::with_config(hub, tree, WritebackConfig::default())
    }

    /// Creates a mirror with explicit side-table settings.
    pub fn with_config(hub: &Arc<Hub>, tree: &Arc<ConfigTree>, config: WritebackConfig) -> Self {
        Self {
            hub: Arc::downgrade(hub),
            tree: Arc::downgrade(tree),
            config,
        }
    }

    fn bound_instance(snapshot: &HubSnapshot, node: NodeId) -> Option<Arc<Instance>> {
        snapshot
            .all_instances()
            .find(|i| binding(i).is_some_and(|b| b.node() == node))
            .cloned()
    }

    /// Stages one attribute edit into `updates`.
    fn stage(
        &self,
        tree: &ConfigTree,
        snapshot: &HubSnapshot,
        updates: &mut BTreeMap<InstanceId, PropertyBag>,
        node: NodeId,
        attribute: &str,
        new_value: Option<&str>,
    ) {
        let Some(tree_node) = tree.node(node) else {
            return;
        };

        if let Some(instance) = Self::bound_instance(snapshot, node) {
            let Some(property) = tree
                .schema()
                .model(tree_node.type_name())
                .and_then(|m| m.attribute(attribute))
            else {
                return;
            };
            let kind = property.attribute_kind().unwrap_or_default();
            let Some(bag) = Self::working_bag(updates, &instance) else {
                return;
            };
            match new_value {
                Some(raw) => {
                    bag.insert(property.bean_name.clone(), parse_value(kind, raw));
                }
                None => {
                    bag.remove(&property.bean_name);
                }
            }
            return;
        }

        // Side-table entry of a bound parent
        if tree_node.type_name() != PROPERTY_TYPE || attribute != self.config.value_attribute {
            trace!(%node, attribute, "tree edit has no hub counterpart");
            return;
        }
        let Some(entry_name) = tree_node.attribute(&self.config.name_attribute) else {
            return;
        };
        let Some(owner) = tree_node
            .parent()
            .and_then(|p| Self::bound_instance(snapshot, p))
        else {
            return;
        };
        let Some(bag) = Self::working_bag(updates, &owner) else {
            return;
        };
        let mut entries = bag
            .get(&self.config.properties_key)
            .and_then(Value::as_map)
            .cloned()
            .unwrap_or_default();
        match new_value {
            Some(raw) => {
                entries.insert(entry_name.to_string(), Value::from(raw));
            }
            None => {
                entries.remove(entry_name);
            }
        }
        bag.insert(self.config.properties_key.clone(), Value::Map(entries));
    }

    fn working_bag<'a>(
        updates: &'a mut BTreeMap<InstanceId, PropertyBag>,
        instance: &Instance,
    ) -> Option<&'a mut PropertyBag> {
        let id = (instance.type_name().to_string(), instance.key().to_string());
        if !updates.contains_key(&id) {
            updates.insert(id.clone(), instance.bean()?.clone());
        }
        updates.get_mut(&id)
    }
}

impl TreeListener for TreeToHubMirror {
    fn tree_changed(&self, events: &[TreeEvent]) {
        let (Some(hub), Some(tree)) = (self.hub.upgrade(), self.tree.upgrade()) else {
            return;
        };
        let snapshot = hub.snapshot();

        let mut updates = BTreeMap::new();
        for event in events {
            match event {
                TreeEvent::AttributeChanged {
                    node,
                    attribute,
                    new_value,
                    ..
                } => self.stage(&tree, &snapshot, &mut updates, *node, attribute, new_value.as_deref()),
                other => debug!(event = ?other, "structural tree edit not mirrored"),
            }
        }
        if updates.is_empty() {
            return;
        }

        let result = hub.commit(CommitOrigin::TreeIntegration, |w| {
            for ((type_name, instance_key), bag) in updates {
                w.modify_instance(&type_name, &instance_key, bag)?;
            }
            Ok(())
        });
        match result {
            Ok(outcome) => debug!(
                version = outcome.version,
                changes = outcome.changes.len(),
                "mirrored tree edits into the hub"
            ),
            Err(error) => warn!(%error, "failed to mirror tree edits into the hub"),
        }
    }
}

/// Parses attribute text back into a typed value; falls back to text.
fn parse_value(kind: AttributeKind, raw: &str) -> Value {
    let parsed = match kind {
        AttributeKind::Bool => raw.parse().ok().map(Value::Bool),
        AttributeKind::Int => raw.parse().ok().map(Value::Integer),
        AttributeKind::Float => raw.parse().ok().map(Value::Float),
        AttributeKind::Text => None,
    };
    parsed.unwrap_or_else(|| Value::from(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_parsing() {
        assert_eq!(parse_value(AttributeKind::Int, "42"), Value::Integer(42));
        assert_eq!(parse_value(AttributeKind::Bool, "true"), Value::Bool(true));
        assert_eq!(parse_value(AttributeKind::Float, "1.5"), Value::Float(1.5));
        assert_eq!(parse_value(AttributeKind::Text, "42"), Value::from("42"));
        assert_eq!(parse_value(AttributeKind::Int, "x"), Value::from("x"));
    }

    #[test]
    fn dead_endpoints_are_ignored() {
        let hub = Arc::new(Hub::new());
        let tree = Arc::new(ConfigTree::new(Arc::new(confhub_tree::Schema::new())));
        let mirror = TreeToHubMirror::new(&hub, &tree);
        drop(hub);
        mirror.tree_changed(&[TreeEvent::RootAdded {
            node: NodeId(1),
            element: "domain".into(),
        }]);
    }
}
