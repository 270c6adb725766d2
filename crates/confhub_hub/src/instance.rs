//! Hub instances.

use crate::value::PropertyBag;
use parking_lot::RwLock;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Opaque metadata attached to an instance by an integration.
pub type Metadata = Arc<dyn Any + Send + Sync>;

/// The data carried by an instance.
#[derive(Clone)]
pub enum Bean {
    /// Generic name/value properties.
    Properties(PropertyBag),
    /// Data the hub cannot interpret.
    Opaque(Arc<dyn Any + Send + Sync>),
}

impl fmt::Debug for Bean {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bean::Properties(bag) => f.debug_tuple("Properties").field(bag).finish(),
            Bean::Opaque(_) => f.write_str("Opaque(..)"),
        }
    }
}

/// A node in the hub, identified by `(type name, instance key)`.
///
/// The bean is immutable for the lifetime of the `Instance`; a modification
/// produces a new `Instance` that inherits the metadata of the old one.
/// Metadata is interior-mutable so integrations can attach it to the live
/// instance while a commit is being prepared.
pub struct Instance {
    type_name: String,
    key: String,
    bean: Bean,
    metadata: RwLock<Option<Metadata>>,
}

impl Instance {
    /// Creates an instance holding a property bag.
    pub fn new(type_name: impl Into<String>, key: impl Into<String>, bag: PropertyBag) -> Self {
        Self::with_bean(type_name, key, Bean::Properties(bag))
    }

    /// Creates an instance holding arbitrary data.
    pub fn with_bean(type_name: impl Into<String>, key: impl Into<String>, bean: Bean) -> Self {
        Self {
            type_name: type_name.into(),
            key: key.into(),
            bean,
            metadata: RwLock::new(None),
        }
    }

    /// Returns the type name.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Returns the instance key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the raw bean.
    pub fn raw_bean(&self) -> &Bean {
        &self.bean
    }

    /// Returns the property bag, or `None` for opaque data.
    pub fn bean(&self) -> Option<&PropertyBag> {
        match &self.bean {
            Bean::Properties(bag) => Some(bag),
            Bean::Opaque(_) => None,
        }
    }

    /// Returns the attached metadata.
    pub fn metadata(&self) -> Option<Metadata> {
        self.metadata.read().clone()
    }

    /// Returns the metadata if it is of type `T`.
    pub fn metadata_as<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.metadata()
            .and_then(|m| Arc::downcast::<T>(m).ok())
    }

    /// Attaches metadata, replacing any previous value.
    pub fn set_metadata(&self, metadata: Metadata) {
        *self.metadata.write() = Some(metadata);
    }

    /// Removes the metadata.
    pub fn clear_metadata(&self) -> Option<Metadata> {
        self.metadata.write().take()
    }

    /// Creates the next version of this instance with a new bean.
    pub(crate) fn successor(&self, bean: Bean) -> Self {
        Self {
            type_name: self.type_name.clone(),
            key: self.key.clone(),
            bean,
            metadata: RwLock::new(self.metadata()),
        }
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("type_name", &self.type_name)
            .field("key", &self.key)
            .field("bean", &self.bean)
            .field("has_metadata", &self.metadata.read().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn bag() -> PropertyBag {
        let mut bag = PropertyBag::new();
        bag.insert("name".into(), Value::from("s1"));
        bag
    }

    #[test]
    fn property_bean() {
        let instance = Instance::new("/domain/server", "domain.s1", bag());
        assert_eq!(instance.type_name(), "/domain/server");
        assert_eq!(instance.key(), "domain.s1");
        assert_eq!(instance.bean().unwrap()["name"], Value::from("s1"));
    }

    #[test]
    fn opaque_bean_has_no_bag() {
        let instance = Instance::with_bean("/x", "x", Bean::Opaque(Arc::new(42u32)));
        assert!(instance.bean().is_none());
    }

    #[test]
    fn metadata_downcast() {
        let instance = Instance::new("/domain", "domain", bag());
        assert!(instance.metadata().is_none());

        instance.set_metadata(Arc::new(7u64));
        assert_eq!(*instance.metadata_as::<u64>().unwrap(), 7);
        assert!(instance.metadata_as::<String>().is_none());

        assert!(instance.clear_metadata().is_some());
        assert!(instance.metadata().is_none());
    }

    #[test]
    fn successor_inherits_metadata() {
        let instance = Instance::new("/domain", "domain", bag());
        instance.set_metadata(Arc::new("node".to_string()));

        let next = instance.successor(Bean::Properties(PropertyBag::new()));
        assert_eq!(next.key(), "domain");
        assert_eq!(next.metadata_as::<String>().unwrap().as_str(), "node");
        assert!(next.bean().unwrap().is_empty());
    }
}
