//! The hub and its two-phase commit protocol.

use crate::change::{Change, PropertyChange};
use crate::error::{HubError, HubResult};
use crate::instance::{Bean, Instance};
use crate::snapshot::{HubSnapshot, InstanceLookup};
use crate::value::{PropertyBag, Value};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::{debug, warn};

/// Identifies who initiated a commit.
///
/// Listeners use the origin to recognise changes they caused themselves.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CommitOrigin {
    /// An ordinary producer writing into the hub.
    #[default]
    Local,
    /// The config tree integration mirroring tree edits into the hub.
    TreeIntegration,
    /// Any other named producer.
    Named(String),
}

impl CommitOrigin {
    /// Returns true if the commit mirrors a change that started in the config tree.
    pub fn is_tree_integration(&self) -> bool {
        matches!(self, CommitOrigin::TreeIntegration)
    }
}

/// Observer of hub commits.
///
/// Listeners are called synchronously on the committing thread while the
/// hub's write lock is held; they must not commit into the same hub.
pub trait HubListener: Send + Sync {
    /// Called before the proposed snapshot becomes current.
    ///
    /// Returning an error vetoes the commit.
    fn prepare(
        &self,
        prior: &HubSnapshot,
        proposed: &HubSnapshot,
        origin: &CommitOrigin,
        changes: &[Change],
    ) -> HubResult<()>;

    /// Called after the proposed snapshot became current.
    fn commit(
        &self,
        prior: &HubSnapshot,
        current: &HubSnapshot,
        origin: &CommitOrigin,
        changes: &[Change],
    );

    /// Called when some listener vetoed the commit.
    fn rollback(
        &self,
        current: &HubSnapshot,
        proposed: &HubSnapshot,
        origin: &CommitOrigin,
        changes: &[Change],
    );
}

/// Result of a successful commit.
#[derive(Debug, Clone)]
pub struct CommitOutcome {
    /// Version of the snapshot that is now current.
    pub version: u64,
    /// Changes that were published.
    pub changes: Vec<Change>,
}

/// Stages writes against a copy of the current snapshot.
pub struct HubWriter {
    staged: HubSnapshot,
    changes: Vec<Change>,
}

impl HubWriter {
    fn new(base: HubSnapshot) -> Self {
        Self {
            staged: base,
            changes: Vec::new(),
        }
    }

    /// Returns the staged version of an instance.
    pub fn instance(&self, type_name: &str, instance_key: &str) -> Option<Arc<Instance>> {
        self.staged.instance(type_name, instance_key)
    }

    /// Adds a type. Returns false if it already existed.
    pub fn add_type(&mut self, type_name: &str) -> bool {
        let added = self.staged.insert_type(type_name);
        if added {
            self.changes.push(Change::AddType {
                type_name: type_name.to_string(),
            });
        }
        added
    }

    /// Removes a type together with all of its instances.
    pub fn remove_type(&mut self, type_name: &str) -> HubResult<()> {
        let instances = self
            .staged
            .remove_type(type_name)
            .ok_or_else(|| HubError::TypeNotFound {
                type_name: type_name.to_string(),
            })?;

        for (key, instance) in instances {
            self.retire(type_name, &key, instance);
        }
        self.changes.push(Change::RemoveType {
            type_name: type_name.to_string(),
        });
        Ok(())
    }

    /// Adds an instance holding a property bag, creating its type if needed.
    pub fn add_instance(
        &mut self,
        type_name: &str,
        instance_key: &str,
        bag: PropertyBag,
    ) -> HubResult<Arc<Instance>> {
        self.add_bean(type_name, instance_key, Bean::Properties(bag))
    }

    /// Adds an instance holding arbitrary data, creating its type if needed.
    pub fn add_bean(
        &mut self,
        type_name: &str,
        instance_key: &str,
        bean: Bean,
    ) -> HubResult<Arc<Instance>> {
        if self.staged.instance(type_name, instance_key).is_some() {
            return Err(HubError::InstanceExists {
                type_name: type_name.to_string(),
                instance_key: instance_key.to_string(),
            });
        }
        self.add_type(type_name);

        let instance = Arc::new(Instance::with_bean(type_name, instance_key, bean));
        self.staged.put_instance(Arc::clone(&instance));
        self.changes.push(Change::AddInstance {
            type_name: type_name.to_string(),
            instance_key: instance_key.to_string(),
            instance: Arc::clone(&instance),
        });
        Ok(instance)
    }

    /// Replaces the property bag of an instance.
    ///
    /// Produces no change if the bag is identical.
    pub fn modify_instance(
        &mut self,
        type_name: &str,
        instance_key: &str,
        bag: PropertyBag,
    ) -> HubResult<Arc<Instance>> {
        let original = self
            .staged
            .instance(type_name, instance_key)
            .ok_or_else(|| HubError::instance_not_found(type_name, instance_key))?;
        let before = original.bean().ok_or_else(|| HubError::NotAPropertyBag {
            type_name: type_name.to_string(),
            instance_key: instance_key.to_string(),
        })?;

        let properties = PropertyChange::diff(before, &bag);
        if properties.is_empty() {
            return Ok(original);
        }

        let instance = Arc::new(original.successor(Bean::Properties(bag)));
        self.staged.put_instance(Arc::clone(&instance));

        // One instance publishes at most one change per commit
        let earlier = self
            .changes
            .iter()
            .position(|c| c.type_name() == type_name && c.instance_key() == Some(instance_key));
        if let Some(index) = earlier {
            match &mut self.changes[index] {
                Change::AddInstance { instance: added, .. } => {
                    *added = Arc::clone(&instance);
                    return Ok(instance);
                }
                Change::ModifyInstance {
                    instance: current,
                    original: first,
                    properties: merged,
                    ..
                } => {
                    *merged = match (first.bean(), instance.bean()) {
                        (Some(a), Some(b)) => PropertyChange::diff(a, b),
                        _ => Vec::new(),
                    };
                    if merged.is_empty() {
                        self.changes.remove(index);
                    } else {
                        *current = Arc::clone(&instance);
                    }
                    return Ok(instance);
                }
                _ => {}
            }
        }

        self.changes.push(Change::ModifyInstance {
            type_name: type_name.to_string(),
            instance_key: instance_key.to_string(),
            instance: Arc::clone(&instance),
            original,
            properties,
        });
        Ok(instance)
    }

    /// Sets a single property of an instance.
    pub fn set_property(
        &mut self,
        type_name: &str,
        instance_key: &str,
        name: &str,
        value: Value,
    ) -> HubResult<Arc<Instance>> {
        let current = self
            .staged
            .instance(type_name, instance_key)
            .ok_or_else(|| HubError::instance_not_found(type_name, instance_key))?;
        let mut bag = current.bean().cloned().ok_or_else(|| HubError::NotAPropertyBag {
            type_name: type_name.to_string(),
            instance_key: instance_key.to_string(),
        })?;
        bag.insert(name.to_string(), value);
        self.modify_instance(type_name, instance_key, bag)
    }

    /// Removes an instance.
    pub fn remove_instance(&mut self, type_name: &str, instance_key: &str) -> HubResult<Arc<Instance>> {
        let instance = self
            .staged
            .take_instance(type_name, instance_key)
            .ok_or_else(|| HubError::instance_not_found(type_name, instance_key))?;
        self.retire(type_name, instance_key, Arc::clone(&instance));
        Ok(instance)
    }

    /// Records a removal, folding away earlier changes to the same instance.
    ///
    /// An instance added in this commit leaves no trace at all.
    fn retire(&mut self, type_name: &str, instance_key: &str, instance: Arc<Instance>) {
        let mut added_here = false;
        self.changes.retain(|c| {
            if c.type_name() != type_name || c.instance_key() != Some(instance_key) {
                return true;
            }
            added_here |= matches!(c, Change::AddInstance { .. });
            false
        });
        if !added_here {
            self.changes.push(Change::RemoveInstance {
                type_name: type_name.to_string(),
                instance_key: instance_key.to_string(),
                instance,
            });
        }
    }

    fn finish(self) -> (HubSnapshot, Vec<Change>) {
        (self.staged, self.changes)
    }
}

/// Versioned, in-memory database of instances.
pub struct Hub {
    current: RwLock<Arc<HubSnapshot>>,
    listeners: RwLock<Vec<Arc<dyn HubListener>>>,
    write_lock: Mutex<()>,
}

impl Hub {
    /// Creates an empty hub.
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(HubSnapshot::new())),
            listeners: RwLock::new(Vec::new()),
            write_lock: Mutex::new(()),
        }
    }

    /// Returns the current snapshot.
    pub fn snapshot(&self) -> Arc<HubSnapshot> {
        Arc::clone(&self.current.read())
    }

    /// Registers a commit listener.
    pub fn register_listener(&self, listener: Arc<dyn HubListener>) {
        self.listeners.write().push(listener);
    }

    /// Returns the number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Stages writes with `f` and publishes them through the listeners.
    ///
    /// Commits are serialized. A commit that stages nothing publishes
    /// nothing and leaves the version unchanged.
    pub fn commit<F>(&self, origin: CommitOrigin, f: F) -> HubResult<CommitOutcome>
    where
        F: FnOnce(&mut HubWriter) -> HubResult<()>,
    {
        let _write_guard = self.write_lock.lock();
        let prior = self.snapshot();

        let mut writer = HubWriter::new((*prior).clone());
        f(&mut writer)?;
        let (mut proposed, changes) = writer.finish();

        if changes.is_empty() {
            return Ok(CommitOutcome {
                version: prior.version(),
                changes,
            });
        }

        proposed.set_version(prior.version() + 1);
        let proposed = Arc::new(proposed);
        let listeners = self.listeners.read().clone();

        debug!(
            version = proposed.version(),
            changes = changes.len(),
            ?origin,
            "preparing hub commit"
        );

        for listener in &listeners {
            if let Err(e) = listener.prepare(&prior, &proposed, &origin, &changes) {
                warn!(version = proposed.version(), error = %e, "hub commit vetoed");
                for l in &listeners {
                    l.rollback(&prior, &proposed, &origin, &changes);
                }
                return Err(e);
            }
        }

        *self.current.write() = Arc::clone(&proposed);

        for listener in &listeners {
            listener.commit(&prior, &proposed, &origin, &changes);
        }

        Ok(CommitOutcome {
            version: proposed.version(),
            changes,
        })
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::ChangeCategory;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Recorder {
        prepared: AtomicUsize,
        committed: AtomicUsize,
        rolled_back: AtomicUsize,
        veto: bool,
        last: Mutex<Vec<ChangeCategory>>,
    }

    impl HubListener for Recorder {
        fn prepare(
            &self,
            _prior: &HubSnapshot,
            _proposed: &HubSnapshot,
            _origin: &CommitOrigin,
            changes: &[Change],
        ) -> HubResult<()> {
            self.prepared.fetch_add(1, Ordering::SeqCst);
            *self.last.lock() = changes.iter().map(Change::category).collect();
            if self.veto {
                Err(HubError::vetoed("no"))
            } else {
                Ok(())
            }
        }

        fn commit(&self, _: &HubSnapshot, _: &HubSnapshot, _: &CommitOrigin, _: &[Change]) {
            self.committed.fetch_add(1, Ordering::SeqCst);
        }

        fn rollback(&self, _: &HubSnapshot, _: &HubSnapshot, _: &CommitOrigin, _: &[Change]) {
            self.rolled_back.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn bag(name: &str) -> PropertyBag {
        let mut bag = PropertyBag::new();
        bag.insert("name".into(), Value::from(name));
        bag
    }

    #[test]
    fn commit_publishes_changes() {
        let hub = Hub::new();
        let recorder = Arc::new(Recorder::default());
        hub.register_listener(recorder.clone());

        let outcome = hub
            .commit(CommitOrigin::Local, |w| {
                w.add_instance("/domain", "domain", bag("d"))?;
                Ok(())
            })
            .unwrap();

        assert_eq!(outcome.version, 1);
        assert_eq!(
            *recorder.last.lock(),
            vec![ChangeCategory::AddType, ChangeCategory::AddInstance]
        );
        assert_eq!(recorder.committed.load(Ordering::SeqCst), 1);
        assert!(hub.snapshot().instance("/domain", "domain").is_some());
    }

    #[test]
    fn veto_rolls_back() {
        let hub = Hub::new();
        let recorder = Arc::new(Recorder {
            veto: true,
            ..Default::default()
        });
        hub.register_listener(recorder.clone());

        let result = hub.commit(CommitOrigin::Local, |w| {
            w.add_instance("/domain", "domain", bag("d"))?;
            Ok(())
        });

        assert!(matches!(result, Err(HubError::Vetoed { .. })));
        assert_eq!(recorder.rolled_back.load(Ordering::SeqCst), 1);
        assert_eq!(recorder.committed.load(Ordering::SeqCst), 0);
        assert_eq!(hub.snapshot().version(), 0);
        assert!(hub.snapshot().instance("/domain", "domain").is_none());
    }

    #[test]
    fn empty_commit_is_silent() {
        let hub = Hub::new();
        let recorder = Arc::new(Recorder::default());
        hub.register_listener(recorder.clone());

        let outcome = hub.commit(CommitOrigin::Local, |_| Ok(())).unwrap();
        assert!(outcome.changes.is_empty());
        assert_eq!(recorder.prepared.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn modify_carries_metadata_and_diff() {
        let hub = Hub::new();
        hub.commit(CommitOrigin::Local, |w| {
            w.add_instance("/domain", "domain", bag("d"))?;
            Ok(())
        })
        .unwrap();

        let original = hub.snapshot().instance("/domain", "domain").unwrap();
        original.set_metadata(Arc::new(5u32));

        let outcome = hub
            .commit(CommitOrigin::Local, |w| {
                w.set_property("/domain", "domain", "name", Value::from("e"))?;
                Ok(())
            })
            .unwrap();

        assert_eq!(outcome.changes.len(), 1);
        let change = &outcome.changes[0];
        assert_eq!(change.category(), ChangeCategory::ModifyInstance);
        assert_eq!(change.modified_properties()[0].name, "name");
        assert_eq!(*change.instance().unwrap().metadata_as::<u32>().unwrap(), 5);
    }

    #[test]
    fn add_then_modify_in_one_commit_is_an_add() {
        let hub = Hub::new();
        let outcome = hub
            .commit(CommitOrigin::Local, |w| {
                w.add_instance("/domain", "domain", bag("d"))?;
                w.set_property("/domain", "domain", "name", Value::from("e"))?;
                Ok(())
            })
            .unwrap();

        let categories: Vec<_> = outcome.changes.iter().map(Change::category).collect();
        assert_eq!(categories, vec![ChangeCategory::AddType, ChangeCategory::AddInstance]);
        let instance = outcome.changes[1].instance().unwrap();
        assert_eq!(instance.bean().unwrap()["name"], Value::from("e"));
    }

    #[test]
    fn modify_twice_in_one_commit_is_one_change() {
        let hub = Hub::new();
        hub.commit(CommitOrigin::Local, |w| {
            w.add_instance("/domain", "domain", bag("d"))?;
            Ok(())
        })
        .unwrap();

        let outcome = hub
            .commit(CommitOrigin::Local, |w| {
                w.set_property("/domain", "domain", "name", Value::from("e"))?;
                w.set_property("/domain", "domain", "logLevel", Value::from("debug"))?;
                Ok(())
            })
            .unwrap();
        assert_eq!(outcome.changes.len(), 1);
        let names: Vec<_> = outcome.changes[0]
            .modified_properties()
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(names, vec!["logLevel", "name"]);

        let reverted = hub
            .commit(CommitOrigin::Local, |w| {
                w.set_property("/domain", "domain", "name", Value::from("x"))?;
                w.set_property("/domain", "domain", "name", Value::from("e"))?;
                Ok(())
            })
            .unwrap();
        assert!(reverted.changes.is_empty());
    }

    #[test]
    fn add_then_remove_cancels_out() {
        let hub = Hub::new();
        hub.commit(CommitOrigin::Local, |w| {
            w.add_type("/domain");
            Ok(())
        })
        .unwrap();

        let outcome = hub
            .commit(CommitOrigin::Local, |w| {
                w.add_instance("/domain", "domain", bag("d"))?;
                w.remove_instance("/domain", "domain")?;
                Ok(())
            })
            .unwrap();
        assert!(outcome.changes.is_empty());
    }

    #[test]
    fn modify_then_remove_is_a_remove() {
        let hub = Hub::new();
        hub.commit(CommitOrigin::Local, |w| {
            w.add_instance("/domain", "domain", bag("d"))?;
            Ok(())
        })
        .unwrap();

        let outcome = hub
            .commit(CommitOrigin::Local, |w| {
                w.set_property("/domain", "domain", "name", Value::from("e"))?;
                w.remove_instance("/domain", "domain")?;
                Ok(())
            })
            .unwrap();
        let categories: Vec<_> = outcome.changes.iter().map(Change::category).collect();
        assert_eq!(categories, vec![ChangeCategory::RemoveInstance]);
    }

    #[test]
    fn remove_type_removes_instances_first() {
        let hub = Hub::new();
        hub.commit(CommitOrigin::Local, |w| {
            w.add_instance("/a", "a1", bag("1"))?;
            w.add_instance("/a", "a2", bag("2"))?;
            Ok(())
        })
        .unwrap();

        let outcome = hub
            .commit(CommitOrigin::Local, |w| w.remove_type("/a"))
            .unwrap();
        let categories: Vec<_> = outcome.changes.iter().map(Change::category).collect();
        assert_eq!(
            categories,
            vec![
                ChangeCategory::RemoveInstance,
                ChangeCategory::RemoveInstance,
                ChangeCategory::RemoveType
            ]
        );
    }

    #[test]
    fn duplicate_add_fails() {
        let hub = Hub::new();
        let result = hub.commit(CommitOrigin::Local, |w| {
            w.add_instance("/a", "a", bag("1"))?;
            w.add_instance("/a", "a", bag("2"))?;
            Ok(())
        });
        assert!(matches!(result, Err(HubError::InstanceExists { .. })));
        assert_eq!(hub.snapshot().instance_count(), 0);
    }

    #[test]
    fn origin_flags() {
        assert!(CommitOrigin::TreeIntegration.is_tree_integration());
        assert!(!CommitOrigin::Local.is_tree_integration());
        assert!(!CommitOrigin::Named("x".into()).is_tree_integration());
    }
}
