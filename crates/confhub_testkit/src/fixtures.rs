//! Test fixtures.
//!
//! Provides a sample schema and a hub wired to a config tree through the
//! writeback engine, with the domain root already bound.

use confhub_hub::{CommitOrigin, CommitOutcome, Hub, HubResult, InstanceLookup, PropertyBag, Value};
use confhub_tree::{AttributeKind, ConfigTree, Node, NodeId, NodeModel, Schema};
use confhub_writeback::{bind, binding, connect, Connection, ReconcileReport, WritebackConfig};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Hub type of the domain root.
pub const DOMAIN_TYPE: &str = "/domain";
/// Hub type of servers (named list slot).
pub const SERVER_TYPE: &str = "/domain/server";
/// Hub type of configs (wildcard list slot).
pub const CONFIG_TYPE: &str = "/domain/config";
/// Instance key of the domain root.
pub const DOMAIN_KEY: &str = "domain";

/// Returns the sample schema.
///
/// `Domain` holds a `server` list, a wildcard slot for `Config`, a single
/// `admin-service` and a property side-table. `Server` and `Config` are
/// keyed by `name`.
pub fn sample_schema() -> Schema {
    Schema::from_models([
        NodeModel::new("Domain")
            .with_attribute("name", AttributeKind::Text)
            .with_attribute("logLevel", AttributeKind::Text)
            .with_element("servers", "server", "Server", false)
            .with_element("adminService", "admin-service", "AdminService", true)
            .with_wildcard("configs", "Config", false)
            .with_property_bag(),
        NodeModel::new("Server")
            .with_key("name")
            .with_required_attribute("name", AttributeKind::Text)
            .with_attribute("port", AttributeKind::Int)
            .with_attribute("enabled", AttributeKind::Bool)
            .with_attribute("weight", AttributeKind::Float)
            .with_attribute("listenAddress", AttributeKind::Text)
            .with_property_bag(),
        NodeModel::new("AdminService").with_attribute("user", AttributeKind::Text),
        NodeModel::new("Config")
            .with_key("name")
            .with_required_attribute("name", AttributeKind::Text)
            .with_attribute("value", AttributeKind::Text),
    ])
}

/// Builds a property bag.
pub fn bag(pairs: &[(&str, Value)]) -> PropertyBag {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

/// Builds a side-table value from name/value pairs.
pub fn properties(pairs: &[(&str, &str)]) -> Value {
    Value::Map(
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Value::from(*v)))
            .collect(),
    )
}

/// Builds an attribute map.
pub fn attrs(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// A hub and a config tree kept in sync by the writeback engine.
pub struct Fixture {
    /// The hub.
    pub hub: Arc<Hub>,
    /// The config tree.
    pub tree: Arc<ConfigTree>,
    /// Both directions of the link.
    pub link: Connection,
    /// Tree root bound to the domain instance.
    pub root: NodeId,
}

impl Fixture {
    /// Creates a fixture with default engine settings.
    pub fn new() -> Self {
        Self::with_config(WritebackConfig::default())
    }

    /// Creates a fixture with explicit engine settings.
    pub fn with_config(config: WritebackConfig) -> Self {
        let tree = Arc::new(ConfigTree::new(Arc::new(sample_schema())));
        let root = tree
            .create_root("Domain", &attrs(&[("name", DOMAIN_KEY)]))
            .expect("Failed to create domain root");

        let hub = Arc::new(Hub::new());
        hub.commit(CommitOrigin::Named("bootstrap".into()), |w| {
            w.add_instance(DOMAIN_TYPE, DOMAIN_KEY, bag(&[("name", Value::from(DOMAIN_KEY))]))?;
            Ok(())
        })
        .expect("Failed to bootstrap hub");
        let domain = hub
            .snapshot()
            .instance(DOMAIN_TYPE, DOMAIN_KEY)
            .expect("Domain instance missing");
        bind(&domain, root);

        let link = connect(&hub, &tree, config);
        Self {
            hub,
            tree,
            link,
            root,
        }
    }

    /// Commits writes as an ordinary producer.
    pub fn commit<F>(&self, f: F) -> HubResult<CommitOutcome>
    where
        F: FnOnce(&mut confhub_hub::HubWriter) -> HubResult<()>,
    {
        self.hub.commit(CommitOrigin::Local, f)
    }

    /// Adds a server keyed `domain.<name>`.
    pub fn add_server(&self, name: &str, extra: &[(&str, Value)]) -> HubResult<CommitOutcome> {
        let mut b = bag(extra);
        b.insert("name".into(), Value::from(name));
        self.commit(|w| {
            w.add_instance(SERVER_TYPE, &format!("{DOMAIN_KEY}.{name}"), b)?;
            Ok(())
        })
    }

    /// Adds a config (wildcard slot) keyed `domain.<name>`.
    pub fn add_config(&self, name: &str, value: &str) -> HubResult<CommitOutcome> {
        self.commit(|w| {
            w.add_instance(
                CONFIG_TYPE,
                &format!("{DOMAIN_KEY}.{name}"),
                bag(&[("name", Value::from(name)), ("value", Value::from(value))]),
            )?;
            Ok(())
        })
    }

    /// Removes an instance.
    pub fn remove(&self, type_name: &str, instance_key: &str) -> HubResult<CommitOutcome> {
        self.commit(|w| {
            w.remove_instance(type_name, instance_key)?;
            Ok(())
        })
    }

    /// Returns the tree node bound to an instance of the current snapshot.
    pub fn node_of(&self, type_name: &str, instance_key: &str) -> Option<Node> {
        let instance = self.hub.snapshot().instance(type_name, instance_key)?;
        self.tree.node(binding(&instance)?.node())
    }

    /// Returns the keys of the children stored under `element`, in order.
    pub fn keys_under(&self, parent: NodeId, element: &str) -> Vec<String> {
        self.tree
            .children_named(parent, element)
            .into_iter()
            .filter_map(|id| self.tree.node(id)?.key().map(str::to_string))
            .collect()
    }

    /// Returns `(element, attributes)` of every child of `parent`, in order.
    pub fn slot_contents(&self, parent: NodeId) -> Vec<(String, BTreeMap<String, String>)> {
        self.tree
            .children(parent)
            .into_iter()
            .filter_map(|id| self.tree.node(id))
            .map(|n| (n.element_name().to_string(), n.attributes().clone()))
            .collect()
    }

    /// Returns the report of the last propagated commit.
    pub fn last_report(&self) -> ReconcileReport {
        self.link.writeback.last_report().unwrap_or_default()
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}
