//! The writeback engine: applies hub commits to the config tree.

use crate::binding::{bind, binding, unbind};
use crate::config::{PropagationPhase, WritebackConfig};
use crate::echo::EchoRegistry;
use crate::error::{WritebackError, WritebackResult};
use crate::lookup::SchemaLookup;
use crate::ordering::order_changes;
use crate::path::ChangePath;
use crate::report::{ChangeFailure, PropertyFailure, ReconcileReport};
use confhub_hub::{
    Change, CommitOrigin, HubListener, HubResult, HubSnapshot, Instance, InstanceLookup, PropertyBag,
    PropertyChange, Value,
};
use confhub_tree::{ConfigTree, Node, NodeId, TreeError, TreeTransaction, PROPERTY_TYPE};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Whether a change touched the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOutcome {
    /// The tree was mutated.
    Applied,
    /// There was nothing to do.
    Skipped,
}

/// Hub listener that writes every committed instance change into a
/// config tree.
///
/// Changes are applied in [`order_changes`] order. Each change is handled on
/// its own: a failing change is reported and the pass moves on, so the tree
/// can end up partially updated. Writes are never undone when the hub rolls
/// back.
pub struct WritebackListener {
    tree: Arc<ConfigTree>,
    lookup: SchemaLookup,
    echo: Arc<EchoRegistry>,
    config: WritebackConfig,
    last_report: Mutex<Option<ReconcileReport>>,
}

impl WritebackListener {
    /// Creates a listener with default settings.
    pub fn new(tree: Arc<ConfigTree>, echo: Arc<EchoRegistry>) -> Self {
        Self::with_config(tree, echo, WritebackConfig::default())
    }

    /// Creates a listener with explicit settings.
    pub fn with_config(tree: Arc<ConfigTree>, echo: Arc<EchoRegistry>, config: WritebackConfig) -> Self {
        let lookup = SchemaLookup::new(Arc::clone(tree.schema()));
        Self {
            tree,
            lookup,
            echo,
            config,
            last_report: Mutex::new(None),
        }
    }

    /// Returns the tree written by this listener.
    pub fn tree(&self) -> &Arc<ConfigTree> {
        &self.tree
    }

    /// Returns the shared echo registry.
    pub fn echo(&self) -> &Arc<EchoRegistry> {
        &self.echo
    }

    /// Returns the settings.
    pub fn config(&self) -> &WritebackConfig {
        &self.config
    }

    /// Returns the schema lookup.
    pub fn lookup(&self) -> &SchemaLookup {
        &self.lookup
    }

    /// Returns the report of the most recent pass run from a hub callback.
    pub fn last_report(&self) -> Option<ReconcileReport> {
        self.last_report.lock().clone()
    }

    /// Takes the report of the most recent pass, leaving none behind.
    pub fn take_report(&self) -> Option<ReconcileReport> {
        self.last_report.lock().take()
    }

    /// Applies one hub batch to the tree.
    ///
    /// Batches mirrored from the tree itself are ignored. Type-level changes
    /// are dropped.
    pub fn reconcile(
        &self,
        store: &dyn InstanceLookup,
        origin: &CommitOrigin,
        changes: &[Change],
    ) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        if origin.is_tree_integration() {
            debug!(changes = changes.len(), "ignoring batch mirrored from the config tree");
            return report;
        }

        for change in order_changes(changes) {
            match self.apply(store, change, &mut report) {
                Ok(ChangeOutcome::Applied) => report.applied += 1,
                Ok(ChangeOutcome::Skipped) => report.skipped += 1,
                Err(error) => {
                    if error.is_fatal() {
                        warn!(%change, %error, "cannot propagate change");
                    } else {
                        warn!(%change, %error, "tree rejected change");
                    }
                    report.failures.push(ChangeFailure {
                        change: change.to_string(),
                        error,
                    });
                }
            }
        }
        report
    }

    fn propagate(&self, store: &HubSnapshot, origin: &CommitOrigin, changes: &[Change]) {
        let report = self.reconcile(store, origin, changes);
        if report.is_clean() {
            debug!(
                version = store.version(),
                applied = report.applied,
                skipped = report.skipped,
                "propagated hub commit"
            );
        } else {
            warn!(
                version = store.version(),
                applied = report.applied,
                failures = report.failures.len(),
                property_failures = report.property_failures.len(),
                "hub commit partially propagated"
            );
        }
        *self.last_report.lock() = Some(report);
    }

    fn apply(
        &self,
        store: &dyn InstanceLookup,
        change: &Change,
        report: &mut ReconcileReport,
    ) -> WritebackResult<ChangeOutcome> {
        let Some(instance) = change.instance() else {
            return Ok(ChangeOutcome::Skipped);
        };
        let Some(bag) = instance.bean() else {
            trace!(%change, "instance holds no property bag");
            return Ok(ChangeOutcome::Skipped);
        };

        match change {
            Change::AddInstance { .. } => self.add_child(store, instance, bag),
            Change::ModifyInstance { properties, .. } => {
                self.modify_instance(instance, properties, report)
            }
            Change::RemoveInstance { .. } => self.remove_child(instance),
            _ => Ok(ChangeOutcome::Skipped),
        }
    }

    /// Returns the live node bound to an instance.
    fn bound_node(&self, instance: &Instance) -> WritebackResult<Node> {
        if instance.metadata().is_none() {
            return Err(WritebackError::missing_metadata(instance.type_name(), instance.key()));
        }
        let bound = binding(instance).map(|b| b.node());
        bound
            .and_then(|id| self.tree.node(id))
            .ok_or_else(|| WritebackError::missing_tree_node(instance.type_name(), instance.key(), bound))
    }

    fn add_child(
        &self,
        store: &dyn InstanceLookup,
        instance: &Arc<Instance>,
        bag: &PropertyBag,
    ) -> WritebackResult<ChangeOutcome> {
        let path = ChangePath::parse(instance.type_name(), instance.key())?;
        let Some((parent_type, parent_key)) = path.parent() else {
            return Err(WritebackError::RootAdd {
                type_name: instance.type_name().to_string(),
                instance_key: instance.key().to_string(),
            });
        };
        let parent = store
            .instance(&parent_type, &parent_key)
            .ok_or_else(|| WritebackError::MissingParent {
                parent_type,
                parent_key,
                instance_key: instance.key().to_string(),
            })?;
        let parent_node = self.bound_node(&parent)?;

        let element = path.element_name();
        let existing_type = self
            .tree
            .element(parent_node.id(), element)
            .and_then(|id| self.tree.node(id))
            .map(|n| n.type_name().to_string());
        let slot = self
            .lookup
            .resolve_child_slot(parent_node.type_name(), element, existing_type.as_deref())?
            .ok_or_else(|| WritebackError::NoSlot {
                parent_type: parent_node.type_name().to_string(),
                element: element.to_string(),
            })?;

        let attributes = self.lookup.translate(&slot.child_type, bag);
        let entries = self.side_table_entries(&slot.child_type, bag);

        let mut names = vec![element.to_string()];
        if slot.wildcard {
            names.push(self.config.wildcard.clone());
        }
        if !entries.is_empty() {
            names.push(self.config.property_element.clone());
        }
        let _known = self.echo.register_all(&names);
        let _quiet = self.echo.suppress();

        let node = self.tree.transaction(|txn| {
            let child = txn.add_child(parent_node.id(), &slot.element_name, &slot.child_type, &attributes)?;
            for (name, value) in &entries {
                let entry = self.entry_attributes(name, value);
                txn.add_child(child, &self.config.property_element, PROPERTY_TYPE, &entry)?;
            }
            Ok(child)
        })?;

        bind(instance, node);
        debug!(
            type_name = instance.type_name(),
            instance_key = instance.key(),
            %node,
            "added tree node"
        );
        Ok(ChangeOutcome::Applied)
    }

    fn modify_instance(
        &self,
        instance: &Instance,
        properties: &[PropertyChange],
        report: &mut ReconcileReport,
    ) -> WritebackResult<ChangeOutcome> {
        if binding(instance).is_none() {
            debug!(
                type_name = instance.type_name(),
                instance_key = instance.key(),
                "modified instance has no tree binding"
            );
            return Ok(ChangeOutcome::Skipped);
        }
        let node = self.bound_node(instance)?;
        let id = node.id();
        let type_name = node.type_name();

        let mut written = 0usize;
        let mut side_table = None;
        {
            let mut known = Vec::new();
            let _quiet = self.echo.suppress();
            self.tree.transaction(|txn| {
                for change in properties {
                    if change.name == self.config.properties_key {
                        side_table = Some(change);
                        continue;
                    }
                    let Some(value) = change.effective_value() else {
                        continue;
                    };
                    if value.is_collection() {
                        trace!(property = %change.name, "skipping collection property");
                        continue;
                    }

                    known.push(self.echo.register(&change.name));
                    let Some(setter) = self.lookup.resolve_setter(type_name, &change.name, value) else {
                        trace!(type_name, property = %change.name, "no attribute for property");
                        continue;
                    };
                    if setter.xml_name != change.name {
                        known.push(self.echo.register(&setter.xml_name));
                    }

                    // A removed property clears the attribute
                    let text = change.new_value.as_ref().and_then(Value::to_attribute_string);
                    match txn.set_attribute(id, &setter.xml_name, text.as_deref()) {
                        Ok(()) => written += 1,
                        Err(error) => {
                            self.record_property_failure(report, instance, &change.name, error);
                        }
                    }
                }
                Ok(())
            })?;
        }

        let mut touched = written > 0;
        let has_bag = self.lookup.model(type_name).is_some_and(|m| m.property_bag);
        if let (Some(change), true) = (side_table, has_bag) {
            touched |= self.reconcile_side_table(instance, id, change, report)?;
        }

        if touched {
            debug!(
                type_name = instance.type_name(),
                instance_key = instance.key(),
                written,
                "modified tree node"
            );
            Ok(ChangeOutcome::Applied)
        } else {
            Ok(ChangeOutcome::Skipped)
        }
    }

    /// Brings the `property` children of `node` in line with the new
    /// side-table value. Returns true if anything was written.
    fn reconcile_side_table(
        &self,
        instance: &Instance,
        node: NodeId,
        change: &PropertyChange,
        report: &mut ReconcileReport,
    ) -> WritebackResult<bool> {
        let desired: BTreeMap<String, String> = change
            .new_value
            .as_ref()
            .and_then(Value::as_map)
            .map(|m| {
                m.iter()
                    .filter_map(|(k, v)| Some((k.clone(), v.to_attribute_string()?)))
                    .collect()
            })
            .unwrap_or_default();

        let element = self.config.property_element.as_str();
        let name_attr = self.config.name_attribute.as_str();
        let value_attr = self.config.value_attribute.as_str();

        let _known = self.echo.register_all([
            element,
            name_attr,
            value_attr,
            self.config.properties_key.as_str(),
        ]);
        let _quiet = self.echo.suppress();

        let mut written = 0usize;
        self.tree.transaction(|txn| {
            let existing = existing_entries(txn, node, element, name_attr, value_attr)?;

            for (name, (child, _)) in &existing {
                if desired.contains_key(name) {
                    continue;
                }
                match txn.delete_child(node, *child) {
                    Ok(()) => written += 1,
                    Err(error) => self.record_property_failure(report, instance, name, error),
                }
            }

            for (name, value) in &desired {
                let result = match existing.get(name) {
                    Some((_, current)) if current.as_deref() == Some(value.as_str()) => continue,
                    Some((child, _)) => txn.set_attribute(*child, value_attr, Some(value)),
                    None => txn
                        .add_child(node, element, PROPERTY_TYPE, &self.entry_attributes(name, value))
                        .map(|_| ()),
                };
                match result {
                    Ok(()) => written += 1,
                    Err(error) => self.record_property_failure(report, instance, name, error),
                }
            }
            Ok(())
        })?;

        trace!(instance_key = instance.key(), written, "reconciled side-table");
        Ok(written > 0)
    }

    fn remove_child(&self, instance: &Instance) -> WritebackResult<ChangeOutcome> {
        let Some(bound) = binding(instance) else {
            debug!(
                type_name = instance.type_name(),
                instance_key = instance.key(),
                "removed instance has no tree binding"
            );
            return Ok(ChangeOutcome::Skipped);
        };
        let Some(node) = self.tree.node(bound.node()) else {
            debug!(instance_key = instance.key(), node = %bound.node(), "tree node already gone");
            unbind(instance);
            return Ok(ChangeOutcome::Skipped);
        };

        let Some(parent) = node.parent() else {
            let _known = self.echo.register(node.element_name());
            let _quiet = self.echo.suppress();
            self.tree.release(node.id())?;
            unbind(instance);
            debug!(instance_key = instance.key(), node = %node.id(), "released tree root");
            return Ok(ChangeOutcome::Applied);
        };

        let path = ChangePath::parse(instance.type_name(), instance.key())?;
        let element = path.element_name();
        let Some(parent_node) = self.tree.node(parent) else {
            return Ok(ChangeOutcome::Skipped);
        };
        let Some(slot) = self
            .lookup
            .resolve_child_slot(parent_node.type_name(), element, Some(node.type_name()))?
        else {
            debug!(element, parent_type = parent_node.type_name(), "no slot holds removed element");
            return Ok(ChangeOutcome::Skipped);
        };

        // The bound node may be stale; locate the live child
        let target = if slot.single {
            self.tree.element(parent, &slot.element_name)
        } else {
            let key = path.list_key();
            self.tree
                .children_named(parent, &slot.element_name)
                .into_iter()
                .find(|c| self.tree.node(*c).is_some_and(|n| n.key() == Some(key)))
                .or_else(|| (node.key().is_none()).then_some(node.id()))
        };
        let Some(target) = target else {
            debug!(element, key = path.list_key(), "list element already absent");
            unbind(instance);
            return Ok(ChangeOutcome::Skipped);
        };

        let mut names = vec![element.to_string()];
        if slot.wildcard {
            names.push(self.config.wildcard.clone());
        }
        let _known = self.echo.register_all(&names);
        let _quiet = self.echo.suppress();

        self.tree.transaction(|txn| txn.delete_child(parent, target))?;
        unbind(instance);
        debug!(
            type_name = instance.type_name(),
            instance_key = instance.key(),
            node = %target,
            "removed tree node"
        );
        Ok(ChangeOutcome::Applied)
    }

    fn side_table_entries(&self, type_name: &str, bag: &PropertyBag) -> Vec<(String, String)> {
        if !self.lookup.model(type_name).is_some_and(|m| m.property_bag) {
            return Vec::new();
        }
        bag.get(&self.config.properties_key)
            .and_then(Value::as_map)
            .map(|m| {
                m.iter()
                    .filter_map(|(k, v)| Some((k.clone(), v.to_attribute_string()?)))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn entry_attributes(&self, name: &str, value: &str) -> BTreeMap<String, String> {
        BTreeMap::from([
            (self.config.name_attribute.clone(), name.to_string()),
            (self.config.value_attribute.clone(), value.to_string()),
        ])
    }

    fn record_property_failure(
        &self,
        report: &mut ReconcileReport,
        instance: &Instance,
        property: &str,
        error: TreeError,
    ) {
        if error.is_rejection() {
            debug!(instance_key = instance.key(), property, %error, "property write rejected");
        } else {
            warn!(instance_key = instance.key(), property, %error, "property write failed");
        }
        report.property_failures.push(PropertyFailure {
            type_name: instance.type_name().to_string(),
            instance_key: instance.key().to_string(),
            property: property.to_string(),
            error,
        });
    }
}

/// Side-table entries of `node` keyed by name.
fn existing_entries(
    txn: &TreeTransaction<'_>,
    node: NodeId,
    element: &str,
    name_attr: &str,
    value_attr: &str,
) -> Result<BTreeMap<String, (NodeId, Option<String>)>, TreeError> {
    let mut entries = BTreeMap::new();
    for child in txn.children_named(node, element)? {
        let entry = txn.node(child)?;
        if let Some(name) = entry.attribute(name_attr) {
            entries.insert(
                name.to_string(),
                (child, entry.attribute(value_attr).map(str::to_string)),
            );
        }
    }
    Ok(entries)
}

impl HubListener for WritebackListener {
    fn prepare(
        &self,
        _prior: &HubSnapshot,
        proposed: &HubSnapshot,
        origin: &CommitOrigin,
        changes: &[Change],
    ) -> HubResult<()> {
        if self.config.phase == PropagationPhase::Prepare {
            self.propagate(proposed, origin, changes);
        }
        Ok(())
    }

    fn commit(&self, _prior: &HubSnapshot, current: &HubSnapshot, origin: &CommitOrigin, changes: &[Change]) {
        if self.config.phase == PropagationPhase::Commit {
            self.propagate(current, origin, changes);
        }
    }

    fn rollback(&self, _current: &HubSnapshot, proposed: &HubSnapshot, _origin: &CommitOrigin, _changes: &[Change]) {
        trace!(version = proposed.version(), "hub commit rolled back");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use confhub_hub::Hub;
    use confhub_tree::{AttributeKind, NodeModel, Schema, ProposedChange};

    fn schema() -> Arc<Schema> {
        Arc::new(Schema::from_models([
            NodeModel::new("Domain")
                .with_attribute("name", AttributeKind::Text)
                .with_element("servers", "server", "Server", false)
                .with_wildcard("configs", "Config", false)
                .with_property_bag(),
            NodeModel::new("Server")
                .with_key("name")
                .with_required_attribute("name", AttributeKind::Text)
                .with_attribute("port", AttributeKind::Int)
                .with_attribute("host", AttributeKind::Text)
                .with_attribute("enabled", AttributeKind::Bool)
                .with_property_bag(),
            NodeModel::new("Config")
                .with_key("name")
                .with_required_attribute("name", AttributeKind::Text)
                .with_attribute("value", AttributeKind::Text),
        ]))
    }

    struct Setup {
        hub: Hub,
        tree: Arc<ConfigTree>,
        listener: Arc<WritebackListener>,
        root: NodeId,
    }

    fn setup() -> Setup {
        let tree = Arc::new(ConfigTree::new(schema()));
        let root = tree
            .create_root("Domain", &BTreeMap::from([("name".to_string(), "d".to_string())]))
            .unwrap();
        let hub = Hub::new();
        hub.commit(CommitOrigin::Named("bootstrap".into()), |w| {
            w.add_instance("/domain", "domain", PropertyBag::new())?;
            Ok(())
        })
        .unwrap();
        bind(&hub.snapshot().instance("/domain", "domain").unwrap(), root);

        let listener = Arc::new(WritebackListener::new(Arc::clone(&tree), Arc::new(EchoRegistry::new())));
        hub.register_listener(listener.clone());
        Setup {
            hub,
            tree,
            listener,
            root,
        }
    }

    fn bag(pairs: &[(&str, Value)]) -> PropertyBag {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn add_server(s: &Setup, name: &str, extra: &[(&str, Value)]) {
        let mut b = bag(extra);
        b.insert("name".into(), Value::from(name));
        s.hub
            .commit(CommitOrigin::Local, |w| {
                w.add_instance("/domain/server", &format!("domain.{name}"), b)?;
                Ok(())
            })
            .unwrap();
    }

    fn server_node(s: &Setup, key: &str) -> Node {
        let instance = s.hub.snapshot().instance("/domain/server", key).unwrap();
        s.tree.node(binding(&instance).unwrap().node()).unwrap()
    }

    #[test]
    fn add_creates_bound_node() {
        let s = setup();
        add_server(&s, "s1", &[("port", Value::from(80)), ("unknown", Value::from("x"))]);

        let node = server_node(&s, "domain.s1");
        assert_eq!(node.parent(), Some(s.root));
        assert_eq!(node.attribute("name"), Some("s1"));
        assert_eq!(node.attribute("port"), Some("80"));
        assert_eq!(node.attributes().len(), 2);

        let report = s.listener.last_report().unwrap();
        assert_eq!(report.applied, 1);
        assert!(report.is_clean());
    }

    #[test]
    fn add_materializes_side_table() {
        let s = setup();
        let props = Value::Map(BTreeMap::from([
            ("a".to_string(), Value::from("1")),
            ("b".to_string(), Value::from(2)),
        ]));
        add_server(&s, "s1", &[("properties", props)]);

        let node = server_node(&s, "domain.s1");
        let entries = s.tree.children_named(node.id(), "property");
        assert_eq!(entries.len(), 2);
        let second = s.tree.node(entries[1]).unwrap();
        assert_eq!(second.attribute("name"), Some("b"));
        assert_eq!(second.attribute("value"), Some("2"));
    }

    #[test]
    fn add_and_modify_in_one_commit_are_ordered() {
        let s = setup();
        s.hub
            .commit(CommitOrigin::Local, |w| {
                w.add_instance("/domain/server", "domain.s2", bag(&[("name", Value::from("s2"))]))?;
                w.set_property("/domain", "domain", "name", Value::from("renamed"))?;
                w.add_instance("/domain/server", "domain.s1", bag(&[("name", Value::from("s1"))]))?;
                Ok(())
            })
            .unwrap();

        let names: Vec<_> = s
            .tree
            .children_named(s.root, "server")
            .into_iter()
            .map(|id| s.tree.node(id).unwrap().attribute("name").unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["s1", "s2"]);
        assert_eq!(s.tree.node(s.root).unwrap().attribute("name"), Some("renamed"));
    }

    #[test]
    fn add_without_bound_parent_fails() {
        let s = setup();
        let before = s.tree.node_count();
        s.hub
            .commit(CommitOrigin::Local, |w| {
                w.add_instance("/other", "other", PropertyBag::new())?;
                w.add_instance("/other/server", "other.s1", bag(&[("name", Value::from("s1"))]))?;
                w.add_instance("/domain/server", "missing.s1", bag(&[("name", Value::from("s1"))]))?;
                Ok(())
            })
            .unwrap();

        let report = s.listener.last_report().unwrap();
        assert_eq!(report.failures.len(), 3);
        assert!(report.fatal_failures().count() == 3);
        assert!(report
            .failures
            .iter()
            .any(|f| matches!(f.error, WritebackError::RootAdd { .. })));
        assert!(report
            .failures
            .iter()
            .any(|f| matches!(f.error, WritebackError::MissingMetadata { .. })));
        assert!(report
            .failures
            .iter()
            .any(|f| matches!(f.error, WritebackError::MissingParent { .. })));
        assert_eq!(s.tree.node_count(), before);
    }

    #[test]
    fn modify_writes_attributes() {
        let s = setup();
        add_server(&s, "s1", &[("port", Value::from(80)), ("host", Value::from("a"))]);
        s.hub
            .commit(CommitOrigin::Local, |w| {
                let mut b = bag(&[("name", Value::from("s1")), ("port", Value::from(81))]);
                b.insert("enabled".into(), Value::from(true));
                b.insert("children".into(), Value::List(vec![Value::from("x")]));
                w.modify_instance("/domain/server", "domain.s1", b)?;
                Ok(())
            })
            .unwrap();

        let node = server_node(&s, "domain.s1");
        assert_eq!(node.attribute("port"), Some("81"));
        assert_eq!(node.attribute("enabled"), Some("true"));
        assert_eq!(node.attribute("host"), None);
        assert!(s.listener.last_report().unwrap().is_clean());
    }

    #[test]
    fn modify_tolerates_vetoed_property() {
        let s = setup();
        add_server(&s, "s1", &[]);
        s.tree.add_validator(Arc::new(|change: &ProposedChange<'_>| match change {
            ProposedChange::SetAttribute { attribute: "host", .. } => Err("host is fixed".to_string()),
            _ => Ok(()),
        }));

        s.hub
            .commit(CommitOrigin::Local, |w| {
                w.modify_instance(
                    "/domain/server",
                    "domain.s1",
                    bag(&[
                        ("name", Value::from("s1")),
                        ("enabled", Value::from(false)),
                        ("host", Value::from("h")),
                        ("port", Value::from(9)),
                    ]),
                )?;
                Ok(())
            })
            .unwrap();

        let node = server_node(&s, "domain.s1");
        assert_eq!(node.attribute("enabled"), Some("false"));
        assert_eq!(node.attribute("host"), None);
        assert_eq!(node.attribute("port"), Some("9"));

        let report = s.listener.last_report().unwrap();
        assert!(report.failures.is_empty());
        assert_eq!(report.property_failures.len(), 1);
        assert!(report.property_failures[0].is_rejection());
        assert_eq!(report.property_failures[0].property, "host");
    }

    #[test]
    fn modify_diffs_side_table() {
        let s = setup();
        let props = |pairs: &[(&str, &str)]| {
            Value::Map(
                pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), Value::from(*v)))
                    .collect(),
            )
        };
        add_server(&s, "s1", &[("properties", props(&[("keep", "1"), ("drop", "2"), ("edit", "3")]))]);
        let node = server_node(&s, "domain.s1");
        let keep_id = s
            .tree
            .children_named(node.id(), "property")
            .into_iter()
            .find(|c| s.tree.node(*c).unwrap().attribute("name") == Some("keep"))
            .unwrap();

        s.hub
            .commit(CommitOrigin::Local, |w| {
                w.set_property(
                    "/domain/server",
                    "domain.s1",
                    "properties",
                    props(&[("keep", "1"), ("edit", "30"), ("new", "4")]),
                )?;
                Ok(())
            })
            .unwrap();

        let entries: BTreeMap<String, String> = s
            .tree
            .children_named(node.id(), "property")
            .into_iter()
            .map(|c| {
                let n = s.tree.node(c).unwrap();
                (
                    n.attribute("name").unwrap().to_string(),
                    n.attribute("value").unwrap().to_string(),
                )
            })
            .collect();
        assert_eq!(
            entries,
            BTreeMap::from([
                ("edit".to_string(), "30".to_string()),
                ("keep".to_string(), "1".to_string()),
                ("new".to_string(), "4".to_string()),
            ])
        );
        assert!(s.tree.contains(keep_id));
    }

    #[test]
    fn modify_of_unbound_instance_is_skipped() {
        let s = setup();
        s.hub
            .commit(CommitOrigin::Local, |w| {
                w.add_instance("/other", "other", PropertyBag::new())?;
                Ok(())
            })
            .unwrap();
        let before = s.tree.node_count();

        s.hub
            .commit(CommitOrigin::Local, |w| {
                w.set_property("/other", "other", "name", Value::from("o"))?;
                Ok(())
            })
            .unwrap();

        let report = s.listener.last_report().unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(report.applied, 0);
        assert!(report.is_clean());
        assert_eq!(s.tree.node_count(), before);
    }

    #[test]
    fn remove_deletes_by_key() {
        let s = setup();
        add_server(&s, "s1", &[]);
        add_server(&s, "s2", &[]);
        let s1 = server_node(&s, "domain.s1").id();

        s.hub
            .commit(CommitOrigin::Local, |w| {
                w.remove_instance("/domain/server", "domain.s2")?;
                Ok(())
            })
            .unwrap();

        assert_eq!(s.tree.children_named(s.root, "server"), vec![s1]);
        assert_eq!(s.listener.last_report().unwrap().applied, 1);
    }

    #[test]
    fn remove_of_absent_node_is_a_no_op() {
        let s = setup();
        add_server(&s, "s1", &[]);
        let node = server_node(&s, "domain.s1").id();
        s.tree.transaction(|t| t.delete_child(s.root, node)).unwrap();
        let before = s.tree.node_count();

        s.hub
            .commit(CommitOrigin::Local, |w| {
                w.remove_instance("/domain/server", "domain.s1")?;
                Ok(())
            })
            .unwrap();

        let report = s.listener.last_report().unwrap();
        assert_eq!(report.skipped, 1);
        assert!(report.is_clean());
        assert_eq!(s.tree.node_count(), before);
    }

    #[test]
    fn remove_root_releases_it() {
        let s = setup();
        s.hub
            .commit(CommitOrigin::Local, |w| {
                w.remove_instance("/domain", "domain")?;
                Ok(())
            })
            .unwrap();
        assert!(s.tree.roots().is_empty());
        assert_eq!(s.tree.node_count(), 0);
    }

    #[test]
    fn mirrored_batches_are_ignored() {
        let s = setup();
        let before = s.tree.node_count();
        s.hub
            .commit(CommitOrigin::TreeIntegration, |w| {
                w.add_instance("/domain/server", "domain.s9", bag(&[("name", Value::from("s9"))]))?;
                Ok(())
            })
            .unwrap();
        assert_eq!(s.tree.node_count(), before);
        assert_eq!(s.listener.last_report().unwrap().visited(), 0);
    }

    #[test]
    fn commit_phase_waits_for_the_hub() {
        let tree = Arc::new(ConfigTree::new(schema()));
        let root = tree.create_root("Domain", &BTreeMap::new()).unwrap();
        let hub = Hub::new();
        hub.commit(CommitOrigin::Local, |w| {
            w.add_instance("/domain", "domain", PropertyBag::new())?;
            Ok(())
        })
        .unwrap();
        bind(&hub.snapshot().instance("/domain", "domain").unwrap(), root);

        let listener = Arc::new(WritebackListener::with_config(
            Arc::clone(&tree),
            Arc::new(EchoRegistry::new()),
            WritebackConfig::new().phase(PropagationPhase::Commit),
        ));
        hub.register_listener(listener.clone());

        struct Veto;
        impl HubListener for Veto {
            fn prepare(&self, _: &HubSnapshot, _: &HubSnapshot, _: &CommitOrigin, _: &[Change]) -> HubResult<()> {
                Err(confhub_hub::HubError::vetoed("closed"))
            }
            fn commit(&self, _: &HubSnapshot, _: &HubSnapshot, _: &CommitOrigin, _: &[Change]) {}
            fn rollback(&self, _: &HubSnapshot, _: &HubSnapshot, _: &CommitOrigin, _: &[Change]) {}
        }
        hub.register_listener(Arc::new(Veto));

        let result = hub.commit(CommitOrigin::Local, |w| {
            w.add_instance("/domain/server", "domain.s1", bag(&[("name", Value::from("s1"))]))?;
            Ok(())
        });
        assert!(result.is_err());
        assert!(tree.children(root).is_empty());
        assert!(listener.last_report().is_none());
    }

    #[test]
    fn echo_is_released_after_pass() {
        let s = setup();
        add_server(&s, "s1", &[]);
        assert!(!s.listener.echo().is_suppressed());
        assert!(s.listener.echo().known_changes().is_empty());
    }
}
