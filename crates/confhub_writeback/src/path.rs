//! Hierarchical type names and instance keys.
//!
//! Type names are `/`-separated element names (`/domain/server`), instance
//! keys are `.`-separated keys (`domain.s1`). Both have one segment per
//! level, so stripping the last segment of each yields the parent.

use crate::error::{WritebackError, WritebackResult};

/// A validated `(type name, instance key)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangePath<'a> {
    type_name: &'a str,
    instance_key: &'a str,
    rooted: bool,
    types: Vec<&'a str>,
    keys: Vec<&'a str>,
}

impl<'a> ChangePath<'a> {
    /// Parses and validates a path.
    pub fn parse(type_name: &'a str, instance_key: &'a str) -> WritebackResult<Self> {
        let rooted = type_name.starts_with('/');
        let body = type_name.strip_prefix('/').unwrap_or(type_name);

        if body.is_empty() {
            return Err(WritebackError::malformed(type_name, instance_key, "empty type name"));
        }
        let types: Vec<&str> = body.split('/').collect();
        if types.iter().any(|s| s.is_empty()) {
            return Err(WritebackError::malformed(type_name, instance_key, "empty type segment"));
        }

        if instance_key.is_empty() {
            return Err(WritebackError::malformed(type_name, instance_key, "empty instance key"));
        }
        let keys: Vec<&str> = instance_key.split('.').collect();
        if keys.iter().any(|s| s.is_empty()) {
            return Err(WritebackError::malformed(type_name, instance_key, "empty key segment"));
        }

        if types.len() != keys.len() {
            return Err(WritebackError::malformed(
                type_name,
                instance_key,
                format!("{} type segments but {} key segments", types.len(), keys.len()),
            ));
        }

        Ok(Self {
            type_name,
            instance_key,
            rooted,
            types,
            keys,
        })
    }

    /// Returns the type name as received.
    pub fn type_name(&self) -> &'a str {
        self.type_name
    }

    /// Returns the instance key as received.
    pub fn instance_key(&self) -> &'a str {
        self.instance_key
    }

    /// Returns the nesting depth (1 for roots).
    pub fn depth(&self) -> usize {
        self.types.len()
    }

    /// Returns true if the path has no parent.
    pub fn is_root(&self) -> bool {
        self.depth() == 1
    }

    /// Returns the element name: the last type segment.
    pub fn element_name(&self) -> &'a str {
        self.types[self.types.len() - 1]
    }

    /// Returns the key used in list slots: the last key segment.
    pub fn list_key(&self) -> &'a str {
        self.keys[self.keys.len() - 1]
    }

    /// Returns the parent's type name and instance key.
    pub fn parent(&self) -> Option<(String, String)> {
        if self.is_root() {
            return None;
        }
        let depth = self.depth() - 1;
        let mut type_name = self.types[..depth].join("/");
        if self.rooted {
            type_name.insert(0, '/');
        }
        Some((type_name, self.keys[..depth].join(".")))
    }
}
