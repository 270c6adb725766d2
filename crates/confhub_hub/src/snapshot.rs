//! Immutable views of the hub.

use crate::instance::Instance;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Read access to instances by `(type name, instance key)`.
pub trait InstanceLookup {
    /// Returns the instance, if present.
    fn instance(&self, type_name: &str, instance_key: &str) -> Option<Arc<Instance>>;
}

/// A consistent version of the hub's contents.
///
/// Snapshots are never mutated once published; the hub builds a new one per
/// commit. Instances are shared between snapshots when unchanged.
#[derive(Debug, Clone, Default)]
pub struct HubSnapshot {
    version: u64,
    types: BTreeMap<String, BTreeMap<String, Arc<Instance>>>,
}

impl HubSnapshot {
    /// Creates an empty snapshot at version 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the commit version of this snapshot.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Returns true if the type exists.
    pub fn has_type(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    /// Returns all type names in order.
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    /// Returns the instances of a type, ordered by key.
    pub fn instances(&self, type_name: &str) -> Vec<Arc<Instance>> {
        self.types
            .get(type_name)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns every instance in the snapshot.
    pub fn all_instances(&self) -> impl Iterator<Item = &Arc<Instance>> {
        self.types.values().flat_map(|m| m.values())
    }

    /// Returns the total number of instances.
    pub fn instance_count(&self) -> usize {
        self.types.values().map(BTreeMap::len).sum()
    }

    pub(crate) fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    pub(crate) fn insert_type(&mut self, type_name: &str) -> bool {
        if self.types.contains_key(type_name) {
            return false;
        }
        self.types.insert(type_name.to_string(), BTreeMap::new());
        true
    }

    pub(crate) fn remove_type(&mut self, type_name: &str) -> Option<BTreeMap<String, Arc<Instance>>> {
        self.types.remove(type_name)
    }

    pub(crate) fn put_instance(&mut self, instance: Arc<Instance>) -> Option<Arc<Instance>> {
        self.types
            .entry(instance.type_name().to_string())
            .or_default()
            .insert(instance.key().to_string(), instance)
    }

    pub(crate) fn take_instance(&mut self, type_name: &str, instance_key: &str) -> Option<Arc<Instance>> {
        self.types.get_mut(type_name)?.remove(instance_key)
    }
}

impl InstanceLookup for HubSnapshot {
    fn instance(&self, type_name: &str, instance_key: &str) -> Option<Arc<Instance>> {
        self.types.get(type_name)?.get(instance_key).cloned()
    }
}
