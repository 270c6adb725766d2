//! Change vocabulary emitted by hub commits.

use crate::instance::Instance;
use crate::value::{PropertyBag, Value};
use std::fmt;
use std::sync::Arc;

/// Category of a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChangeCategory {
    /// A type was added.
    AddType,
    /// A type was removed.
    RemoveType,
    /// A type's own metadata changed.
    ModifyType,
    /// An instance was added.
    AddInstance,
    /// An instance's properties changed.
    ModifyInstance,
    /// An instance was removed.
    RemoveInstance,
}

impl ChangeCategory {
    /// Returns true for categories that concern a single instance.
    pub fn is_instance_change(&self) -> bool {
        matches!(
            self,
            ChangeCategory::AddInstance
                | ChangeCategory::ModifyInstance
                | ChangeCategory::RemoveInstance
        )
    }
}

/// Before/after pair for one modified property.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyChange {
    /// Generic property name.
    pub name: String,
    /// Value before the change (`None` if the property was absent).
    pub old_value: Option<Value>,
    /// Value after the change (`None` if the property was removed).
    pub new_value: Option<Value>,
}

impl PropertyChange {
    /// Creates a property change record.
    pub fn new(name: impl Into<String>, old_value: Option<Value>, new_value: Option<Value>) -> Self {
        Self {
            name: name.into(),
            old_value,
            new_value,
        }
    }

    /// Returns the new value, or the old one if the property was removed.
    pub fn effective_value(&self) -> Option<&Value> {
        self.new_value.as_ref().or(self.old_value.as_ref())
    }

    /// Computes the ordered list of differences between two bags.
    pub fn diff(before: &PropertyBag, after: &PropertyBag) -> Vec<PropertyChange> {
        let mut changes = Vec::new();

        for (name, old) in before {
            match after.get(name) {
                Some(new) if new == old => {}
                new => changes.push(PropertyChange::new(name, Some(old.clone()), new.cloned())),
            }
        }

        for (name, new) in after {
            if !before.contains_key(name) {
                changes.push(PropertyChange::new(name, None, Some(new.clone())));
            }
        }

        changes.sort_by(|a, b| a.name.cmp(&b.name));
        changes
    }
}

/// One immutable mutation observed on the hub.
///
/// Instance-level variants carry only the fields their handlers need.
#[derive(Debug, Clone)]
pub enum Change {
    /// A type was added.
    AddType {
        /// Name of the type.
        type_name: String,
    },
    /// A type was removed.
    RemoveType {
        /// Name of the type.
        type_name: String,
    },
    /// A type's own metadata changed.
    ModifyType {
        /// Name of the type.
        type_name: String,
    },
    /// An instance was added.
    AddInstance {
        /// Name of the instance's type.
        type_name: String,
        /// Key of the instance.
        instance_key: String,
        /// The live instance in the proposed snapshot.
        instance: Arc<Instance>,
    },
    /// An instance's properties changed.
    ModifyInstance {
        /// Name of the instance's type.
        type_name: String,
        /// Key of the instance.
        instance_key: String,
        /// The new version of the instance.
        instance: Arc<Instance>,
        /// The version that was replaced.
        original: Arc<Instance>,
        /// Per-property before/after pairs.
        properties: Vec<PropertyChange>,
    },
    /// An instance was removed.
    RemoveInstance {
        /// Name of the instance's type.
        type_name: String,
        /// Key of the instance.
        instance_key: String,
        /// The former instance.
        instance: Arc<Instance>,
    },
}

impl Change {
    /// Returns the category of this change.
    pub fn category(&self) -> ChangeCategory {
        match self {
            Change::AddType { .. } => ChangeCategory::AddType,
            Change::RemoveType { .. } => ChangeCategory::RemoveType,
            Change::ModifyType { .. } => ChangeCategory::ModifyType,
            Change::AddInstance { .. } => ChangeCategory::AddInstance,
            Change::ModifyInstance { .. } => ChangeCategory::ModifyInstance,
            Change::RemoveInstance { .. } => ChangeCategory::RemoveInstance,
        }
    }

    /// Returns the affected type name.
    pub fn type_name(&self) -> &str {
        match self {
            Change::AddType { type_name }
            | Change::RemoveType { type_name }
            | Change::ModifyType { type_name }
            | Change::AddInstance { type_name, .. }
            | Change::ModifyInstance { type_name, .. }
            | Change::RemoveInstance { type_name, .. } => type_name,
        }
    }

    /// Returns the instance key for instance-level changes.
    pub fn instance_key(&self) -> Option<&str> {
        match self {
            Change::AddInstance { instance_key, .. }
            | Change::ModifyInstance { instance_key, .. }
            | Change::RemoveInstance { instance_key, .. } => Some(instance_key),
            _ => None,
        }
    }

    /// Returns the instance for instance-level changes.
    pub fn instance(&self) -> Option<&Arc<Instance>> {
        match self {
            Change::AddInstance { instance, .. }
            | Change::ModifyInstance { instance, .. }
            | Change::RemoveInstance { instance, .. } => Some(instance),
            _ => None,
        }
    }

    /// Returns the modified properties of a `ModifyInstance` change.
    pub fn modified_properties(&self) -> &[PropertyChange] {
        match self {
            Change::ModifyInstance { properties, .. } => properties,
            _ => &[],
        }
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.instance_key() {
            Some(key) => write!(f, "{:?}({}, {})", self.category(), self.type_name(), key),
            None => write!(f, "{:?}({})", self.category(), self.type_name()),
        }
    }
}
