//! The config tree and its transactions.

use crate::config::TreeConfig;
use crate::error::{TreeError, TreeResult};
use crate::event::{TreeEvent, TreeListener};
use crate::node::{Node, NodeId};
use crate::schema::{NodeModel, Schema};
use crate::validator::{ProposedChange, Validator};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, trace};

#[derive(Debug, Clone, Default)]
struct TreeState {
    nodes: HashMap<NodeId, Node>,
    roots: Vec<NodeId>,
    next_id: u64,
}

impl TreeState {
    fn node(&self, id: NodeId) -> TreeResult<&Node> {
        self.nodes.get(&id).ok_or(TreeError::NodeNotFound { id })
    }

    fn node_mut(&mut self, id: NodeId) -> TreeResult<&mut Node> {
        self.nodes.get_mut(&id).ok_or(TreeError::NodeNotFound { id })
    }

    fn allocate(&mut self) -> NodeId {
        self.next_id += 1;
        NodeId(self.next_id)
    }

    fn children_named(&self, parent: &Node, element_name: &str) -> Vec<NodeId> {
        parent
            .children
            .iter()
            .copied()
            .filter(|c| {
                self.nodes
                    .get(c)
                    .is_some_and(|n| n.element_name == element_name)
            })
            .collect()
    }

    fn remove_subtree(&mut self, id: NodeId) {
        let mut pending = vec![id];
        while let Some(next) = pending.pop() {
            if let Some(node) = self.nodes.remove(&next) {
                pending.extend(node.children);
            }
        }
    }
}

/// A schema-validated tree of configuration nodes.
///
/// Reads observe the last committed state. Writes go through
/// [`ConfigTree::transaction`], which stages every mutation on a working
/// copy and publishes it atomically.
pub struct ConfigTree {
    schema: Arc<Schema>,
    config: TreeConfig,
    state: RwLock<TreeState>,
    write_lock: Mutex<()>,
    validators: RwLock<Vec<Arc<dyn Validator>>>,
    listeners: RwLock<Vec<Arc<dyn TreeListener>>>,
    history: RwLock<Vec<TreeEvent>>,
}

impl ConfigTree {
    /// Creates an empty tree over a schema.
    pub fn new(schema: Arc<Schema>) -> Self {
        Self::with_config(schema, TreeConfig::default())
    }

    /// Creates an empty tree with explicit settings.
    pub fn with_config(schema: Arc<Schema>, config: TreeConfig) -> Self {
        Self {
            schema,
            config,
            state: RwLock::new(TreeState::default()),
            write_lock: Mutex::new(()),
            validators: RwLock::new(Vec::new()),
            listeners: RwLock::new(Vec::new()),
            history: RwLock::new(Vec::new()),
        }
    }

    /// Returns the schema.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Registers a validator consulted before every mutation.
    pub fn add_validator(&self, validator: Arc<dyn Validator>) {
        self.validators.write().push(validator);
    }

    /// Registers a listener for committed transactions.
    pub fn add_listener(&self, listener: Arc<dyn TreeListener>) {
        self.listeners.write().push(listener);
    }

    /// Returns a copy of a node.
    pub fn node(&self, id: NodeId) -> Option<Node> {
        self.state.read().nodes.get(&id).cloned()
    }

    /// Returns true if the node exists.
    pub fn contains(&self, id: NodeId) -> bool {
        self.state.read().nodes.contains_key(&id)
    }

    /// Returns the model of a node's type.
    pub fn model_of(&self, id: NodeId) -> Option<&NodeModel> {
        let type_name = self.state.read().nodes.get(&id)?.type_name.clone();
        self.schema.model(&type_name)
    }

    /// Returns the parent of a node.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.state.read().nodes.get(&id)?.parent
    }

    /// Returns the first child stored under `element_name`.
    pub fn element(&self, parent: NodeId, element_name: &str) -> Option<NodeId> {
        let state = self.state.read();
        let node = state.nodes.get(&parent)?;
        state.children_named(node, element_name).into_iter().next()
    }

    /// Returns all children stored under `element_name`, in insertion order.
    pub fn children_named(&self, parent: NodeId, element_name: &str) -> Vec<NodeId> {
        let state = self.state.read();
        state
            .nodes
            .get(&parent)
            .map(|node| state.children_named(node, element_name))
            .unwrap_or_default()
    }

    /// Returns all children in insertion order.
    pub fn children(&self, parent: NodeId) -> Vec<NodeId> {
        self.state
            .read()
            .nodes
            .get(&parent)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    /// Returns the roots in creation order.
    pub fn roots(&self) -> Vec<NodeId> {
        self.state.read().roots.clone()
    }

    /// Returns the number of nodes.
    pub fn node_count(&self) -> usize {
        self.state.read().nodes.len()
    }

    /// Returns the most recent committed events, oldest first.
    pub fn recent_events(&self) -> Vec<TreeEvent> {
        self.history.read().clone()
    }

    /// Creates a root node.
    pub fn create_root(&self, type_name: &str, attributes: &BTreeMap<String, String>) -> TreeResult<NodeId> {
        self.transaction(|txn| txn.create_root(type_name, attributes))
    }

    /// Removes a root node and its subtree.
    pub fn release(&self, root: NodeId) -> TreeResult<()> {
        self.transaction(|txn| txn.release_root(root))
    }

    /// Runs `f` against a working copy and commits it if `f` succeeds.
    ///
    /// The transaction is all-or-nothing: an error from `f` discards every
    /// staged mutation. Mutations that `f` chose to tolerate (for example a
    /// vetoed attribute) are simply absent from the committed state.
    /// Listeners are notified after the write lock is released.
    pub fn transaction<T, F>(&self, f: F) -> TreeResult<T>
    where
        F: FnOnce(&mut TreeTransaction<'_>) -> TreeResult<T>,
    {
        let (result, events) = {
            let _write_guard = self.write_lock.lock();
            let validators = self.validators.read().clone();
            let mut txn = TreeTransaction {
                state: self.state.read().clone(),
                schema: &self.schema,
                validators: &validators,
                events: Vec::new(),
            };

            let result = match f(&mut txn) {
                Ok(value) => value,
                Err(e) => {
                    debug!(error = %e, "tree transaction rolled back");
                    return Err(e);
                }
            };

            let TreeTransaction { state, events, .. } = txn;
            *self.state.write() = state;
            (result, events)
        };

        if !events.is_empty() {
            trace!(events = events.len(), "tree transaction committed");
            self.record(&events);
            let listeners = self.listeners.read().clone();
            for listener in &listeners {
                listener.tree_changed(&events);
            }
        }

        Ok(result)
    }

    fn record(&self, events: &[TreeEvent]) {
        if self.config.event_history == 0 {
            return;
        }
        let mut history = self.history.write();
        history.extend(events.iter().cloned());
        if history.len() > self.config.event_history {
            let excess = history.len() - self.config.event_history;
            history.drain(0..excess);
        }
    }

    /// Renders a subtree as indented text.
    pub fn render(&self, id: NodeId) -> String {
        let state = self.state.read();
        let mut out = String::new();
        let mut stack = vec![(id, 0usize)];
        while let Some((next, depth)) = stack.pop() {
            let Some(node) = state.nodes.get(&next) else {
                continue;
            };
            let _ = write!(out, "{}{} [{}]", "  ".repeat(depth), node.element_name, node.id);
            for (name, value) in &node.attributes {
                let _ = write!(out, " {name}={value:?}");
            }
            out.push('\n');
            for child in node.children.iter().rev() {
                stack.push((*child, depth + 1));
            }
        }
        out
    }
}

/// Staged mutations of one tree transaction.
pub struct TreeTransaction<'a> {
    state: TreeState,
    schema: &'a Schema,
    validators: &'a [Arc<dyn Validator>],
    events: Vec<TreeEvent>,
}

impl<'a> TreeTransaction<'a> {
    /// Returns a staged node.
    pub fn node(&self, id: NodeId) -> TreeResult<&Node> {
        self.state.node(id)
    }

    /// Returns the staged children of `parent` stored under `element_name`.
    pub fn children_named(&self, parent: NodeId, element_name: &str) -> TreeResult<Vec<NodeId>> {
        let node = self.state.node(parent)?;
        Ok(self.state.children_named(node, element_name))
    }

    fn model(&self, type_name: &str) -> TreeResult<&'a NodeModel> {
        self.schema.model(type_name).ok_or_else(|| TreeError::UnknownType {
            type_name: type_name.to_string(),
        })
    }

    fn validate(&self, change: ProposedChange<'_>) -> TreeResult<()> {
        for validator in self.validators {
            validator.validate(&change).map_err(TreeError::vetoed)?;
        }
        Ok(())
    }

    fn check_attributes(model: &NodeModel, attributes: &BTreeMap<String, String>) -> TreeResult<()> {
        for (name, value) in attributes {
            check_attribute(model, name, Some(value))?;
        }
        for required in model.attributes().filter(|p| p.is_required()) {
            if !attributes.contains_key(&required.xml_name) {
                return Err(TreeError::MissingAttribute {
                    type_name: model.type_name.clone(),
                    attribute: required.xml_name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Creates a root node.
    pub fn create_root(&mut self, type_name: &str, attributes: &BTreeMap<String, String>) -> TreeResult<NodeId> {
        let model = self.model(type_name)?;
        Self::check_attributes(model, attributes)?;
        let element = model.element_name.clone();
        let key_attribute = model.key.clone();

        let id = self.state.allocate();
        self.state.nodes.insert(
            id,
            Node {
                id,
                type_name: type_name.to_string(),
                element_name: element.clone(),
                parent: None,
                key_attribute,
                attributes: attributes.clone(),
                children: Vec::new(),
            },
        );
        self.state.roots.push(id);
        self.events.push(TreeEvent::RootAdded { node: id, element });
        Ok(id)
    }

    /// Removes a root node and its subtree.
    pub fn release_root(&mut self, root: NodeId) -> TreeResult<()> {
        let node = self.state.node(root)?;
        if node.parent.is_some() {
            return Err(TreeError::NotARoot { node: root });
        }
        let element = node.element_name.clone();
        self.state.remove_subtree(root);
        self.state.roots.retain(|r| *r != root);
        self.events.push(TreeEvent::RootReleased { node: root, element });
        Ok(())
    }

    /// Adds a child under `element_name` with initial attributes.
    ///
    /// The parent's model must expose a slot accepting `child_type` under
    /// that element name. Single slots accept one child; list slots reject
    /// a second child with the same key.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        element_name: &str,
        child_type: &str,
        attributes: &BTreeMap<String, String>,
    ) -> TreeResult<NodeId> {
        let parent_node = self.state.node(parent)?;
        let parent_model = self.model(&parent_node.type_name)?;
        let child_model = self.model(child_type)?;

        let slot = self
            .schema
            .accepting_slot(parent_model, element_name, child_type)
            .ok_or_else(|| TreeError::NoSuchSlot {
                parent_type: parent_model.type_name.clone(),
                element: element_name.to_string(),
                child_type: child_type.to_string(),
            })?;

        let siblings = self.state.children_named(parent_node, element_name);
        if slot.is_single() && !siblings.is_empty() {
            return Err(TreeError::SlotOccupied {
                parent,
                element: element_name.to_string(),
            });
        }
        if let Some(key) = child_model.key.as_ref().and_then(|k| attributes.get(k)) {
            let duplicate = siblings
                .iter()
                .filter_map(|s| self.state.nodes.get(s))
                .any(|s| s.key() == Some(key.as_str()));
            if duplicate {
                return Err(TreeError::DuplicateKey {
                    element: element_name.to_string(),
                    key: key.clone(),
                });
            }
        }

        Self::check_attributes(child_model, attributes)?;
        self.validate(ProposedChange::AddChild {
            parent: parent_node,
            element: element_name,
            child_type,
            attributes,
        })?;

        let key_attribute = child_model.key.clone();
        let id = self.state.allocate();
        self.state.nodes.insert(
            id,
            Node {
                id,
                type_name: child_type.to_string(),
                element_name: element_name.to_string(),
                parent: Some(parent),
                key_attribute,
                attributes: attributes.clone(),
                children: Vec::new(),
            },
        );
        self.state.node_mut(parent)?.children.push(id);
        self.events.push(TreeEvent::ChildAdded {
            parent,
            child: id,
            element: element_name.to_string(),
        });
        Ok(id)
    }

    /// Sets (or with `None`, removes) an attribute.
    pub fn set_attribute(&mut self, node: NodeId, attribute: &str, value: Option<&str>) -> TreeResult<()> {
        let target = self.state.node(node)?;
        let model = self.model(&target.type_name)?;
        check_attribute(model, attribute, value)?;

        let old_value = target.attributes.get(attribute).cloned();
        if old_value.as_deref() == value {
            return Ok(());
        }

        self.validate(ProposedChange::SetAttribute {
            node: target,
            attribute,
            old_value: old_value.as_deref(),
            new_value: value,
        })?;

        let element = target.element_name.clone();
        let target = self.state.node_mut(node)?;
        match value {
            Some(v) => {
                target.attributes.insert(attribute.to_string(), v.to_string());
            }
            None => {
                target.attributes.remove(attribute);
            }
        }
        self.events.push(TreeEvent::AttributeChanged {
            node,
            element,
            attribute: attribute.to_string(),
            old_value,
            new_value: value.map(str::to_string),
        });
        Ok(())
    }

    /// Deletes a direct child of `parent` together with its subtree.
    pub fn delete_child(&mut self, parent: NodeId, child: NodeId) -> TreeResult<()> {
        let parent_node = self.state.node(parent)?;
        let child_node = self.state.node(child)?;
        if child_node.parent != Some(parent) {
            return Err(TreeError::NotAChild { parent, child });
        }

        self.validate(ProposedChange::DeleteChild {
            parent: parent_node,
            child: child_node,
        })?;

        let element = child_node.element_name.clone();
        self.state.node_mut(parent)?.children.retain(|c| *c != child);
        self.state.remove_subtree(child);
        self.events.push(TreeEvent::ChildRemoved {
            parent,
            child,
            element,
        });
        Ok(())
    }
}

fn check_attribute(model: &NodeModel, name: &str, value: Option<&str>) -> TreeResult<()> {
    let property = model.attribute(name).ok_or_else(|| TreeError::UnknownAttribute {
        type_name: model.type_name.clone(),
        attribute: name.to_string(),
    })?;

    match value {
        Some(raw) => {
            let kind = property.attribute_kind().unwrap_or_default();
            if !kind.check(raw) {
                return Err(TreeError::InvalidValue {
                    attribute: name.to_string(),
                    value: raw.to_string(),
                    kind,
                });
            }
        }
        None if property.is_required() => {
            return Err(TreeError::MissingAttribute {
                type_name: model.type_name.clone(),
                attribute: name.to_string(),
            });
        }
        None => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AttributeKind, NodeModel, PROPERTY_ELEMENT, PROPERTY_TYPE};

    fn schema() -> Arc<Schema> {
        Arc::new(Schema::from_models([
            NodeModel::new("Domain")
                .with_attribute("name", AttributeKind::Text)
                .with_element("servers", "server", "Server", false)
                .with_element("admin", "admin", "Admin", true)
                .with_property_bag(),
            NodeModel::new("Server")
                .with_key("name")
                .with_required_attribute("name", AttributeKind::Text)
                .with_attribute("port", AttributeKind::Int),
            NodeModel::new("Admin").with_attribute("user", AttributeKind::Text),
        ]))
    }

    fn attrs(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn tree_with_root() -> (ConfigTree, NodeId) {
        let tree = ConfigTree::new(schema());
        let root = tree.create_root("Domain", &attrs(&[("name", "d")])).unwrap();
        (tree, root)
    }

    #[test]
    fn add_and_read_children() {
        let (tree, root) = tree_with_root();
        let s1 = tree
            .transaction(|t| t.add_child(root, "server", "Server", &attrs(&[("name", "s1")])))
            .unwrap();
        let s2 = tree
            .transaction(|t| t.add_child(root, "server", "Server", &attrs(&[("name", "s2")])))
            .unwrap();

        assert_eq!(tree.children_named(root, "server"), vec![s1, s2]);
        assert_eq!(tree.element(root, "server"), Some(s1));
        assert_eq!(tree.parent(s2), Some(root));
        assert_eq!(tree.node(s2).unwrap().key(), Some("s2"));
        assert_eq!(tree.model_of(s1).unwrap().type_name, "Server");
    }

    #[test]
    fn slot_rules() {
        let (tree, root) = tree_with_root();
        tree.transaction(|t| t.add_child(root, "admin", "Admin", &BTreeMap::new()))
            .unwrap();

        let err = tree
            .transaction(|t| t.add_child(root, "admin", "Admin", &BTreeMap::new()))
            .unwrap_err();
        assert!(matches!(err, TreeError::SlotOccupied { .. }));

        let err = tree
            .transaction(|t| t.add_child(root, "nope", "Server", &attrs(&[("name", "x")])))
            .unwrap_err();
        assert!(matches!(err, TreeError::NoSuchSlot { .. }));

        tree.transaction(|t| t.add_child(root, "server", "Server", &attrs(&[("name", "s1")])))
            .unwrap();
        let err = tree
            .transaction(|t| t.add_child(root, "server", "Server", &attrs(&[("name", "s1")])))
            .unwrap_err();
        assert!(matches!(err, TreeError::DuplicateKey { .. }));
    }

    #[test]
    fn attribute_validation() {
        let (tree, root) = tree_with_root();
        let err = tree
            .transaction(|t| t.add_child(root, "server", "Server", &attrs(&[("port", "80")])))
            .unwrap_err();
        assert!(matches!(err, TreeError::MissingAttribute { .. }));

        let s1 = tree
            .transaction(|t| t.add_child(root, "server", "Server", &attrs(&[("name", "s1")])))
            .unwrap();
        let err = tree
            .transaction(|t| t.set_attribute(s1, "port", Some("eighty")))
            .unwrap_err();
        assert!(err.is_rejection());

        let err = tree
            .transaction(|t| t.set_attribute(s1, "color", Some("red")))
            .unwrap_err();
        assert!(matches!(err, TreeError::UnknownAttribute { .. }));
    }

    #[test]
    fn failed_transaction_discards_everything() {
        let (tree, root) = tree_with_root();
        let before = tree.node_count();

        let result: TreeResult<()> = tree.transaction(|t| {
            t.add_child(root, "server", "Server", &attrs(&[("name", "s1")]))?;
            Err(TreeError::aborted("changed my mind"))
        });

        assert!(result.is_err());
        assert_eq!(tree.node_count(), before);
        assert!(tree.children(root).is_empty());
    }

    #[test]
    fn tolerated_veto_keeps_other_writes() {
        let (tree, root) = tree_with_root();
        let s1 = tree
            .transaction(|t| t.add_child(root, "server", "Server", &attrs(&[("name", "s1")])))
            .unwrap();

        tree.add_validator(Arc::new(|change: &ProposedChange<'_>| match change {
            ProposedChange::SetAttribute {
                attribute: "port",
                new_value: Some("1"),
                ..
            } => Err("privileged port".to_string()),
            _ => Ok(()),
        }));

        tree.transaction(|t| {
            let vetoed = t.set_attribute(s1, "port", Some("1"));
            assert!(matches!(vetoed, Err(TreeError::Vetoed { .. })));
            t.set_attribute(root, "name", Some("renamed"))
        })
        .unwrap();

        assert_eq!(tree.node(root).unwrap().attribute("name"), Some("renamed"));
        assert_eq!(tree.node(s1).unwrap().attribute("port"), None);
    }

    #[test]
    fn delete_child_removes_subtree() {
        let (tree, root) = tree_with_root();
        let prop = tree
            .transaction(|t| {
                t.add_child(
                    root,
                    PROPERTY_ELEMENT,
                    PROPERTY_TYPE,
                    &attrs(&[("name", "a"), ("value", "b")]),
                )
            })
            .unwrap();
        let s1 = tree
            .transaction(|t| t.add_child(root, "server", "Server", &attrs(&[("name", "s1")])))
            .unwrap();

        let err = tree.transaction(|t| t.delete_child(s1, prop)).unwrap_err();
        assert!(matches!(err, TreeError::NotAChild { .. }));

        tree.transaction(|t| t.delete_child(root, s1)).unwrap();
        assert!(!tree.contains(s1));
        assert_eq!(tree.children(root), vec![prop]);
    }

    #[test]
    fn release_root() {
        let (tree, root) = tree_with_root();
        let s1 = tree
            .transaction(|t| t.add_child(root, "server", "Server", &attrs(&[("name", "s1")])))
            .unwrap();

        assert!(matches!(tree.release(s1), Err(TreeError::NotARoot { .. })));
        tree.release(root).unwrap();
        assert_eq!(tree.node_count(), 0);
        assert!(tree.roots().is_empty());
    }

    #[test]
    fn listeners_see_committed_events() {
        let (tree, root) = tree_with_root();
        let seen = Arc::new(Mutex::new(Vec::<TreeEvent>::new()));
        let sink = Arc::clone(&seen);
        tree.add_listener(Arc::new(move |events: &[TreeEvent]| {
            sink.lock().extend(events.iter().cloned());
        }));

        let s1 = tree
            .transaction(|t| {
                let s1 = t.add_child(root, "server", "Server", &attrs(&[("name", "s1")]))?;
                t.set_attribute(s1, "port", Some("80"))?;
                Ok(s1)
            })
            .unwrap();

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(
            seen[0],
            TreeEvent::ChildAdded {
                parent: root,
                child: s1,
                element: "server".into()
            }
        );
        assert_eq!(seen[1].name(), "port");
    }

    #[test]
    fn unchanged_attribute_emits_nothing() {
        let (tree, root) = tree_with_root();
        let before = tree.recent_events().len();
        tree.transaction(|t| t.set_attribute(root, "name", Some("d")))
            .unwrap();
        assert_eq!(tree.recent_events().len(), before);
    }

    #[test]
    fn history_is_bounded() {
        let tree = ConfigTree::with_config(schema(), TreeConfig::new().event_history(2));
        let root = tree.create_root("Domain", &BTreeMap::new()).unwrap();
        for name in ["a", "b", "c"] {
            tree.transaction(|t| t.set_attribute(root, "name", Some(name)))
                .unwrap();
        }
        let history = tree.recent_events();
        assert_eq!(history.len(), 2);
        assert!(matches!(
            &history[1],
            TreeEvent::AttributeChanged { new_value: Some(v), .. } if v == "c"
        ));
    }

    #[test]
    fn render_is_indented() {
        let (tree, root) = tree_with_root();
        tree.transaction(|t| t.add_child(root, "server", "Server", &attrs(&[("name", "s1")])))
            .unwrap();
        let text = tree.render(root);
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("domain [node:1]"));
        assert!(lines[1].starts_with("  server [node:2] name=\"s1\""));
    }
}
