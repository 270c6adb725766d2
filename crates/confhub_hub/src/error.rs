//! Error types for the hub.

use thiserror::Error;

/// Result type for hub operations.
pub type HubResult<T> = Result<T, HubError>;

/// Errors that can occur while staging or committing hub changes.
#[derive(Debug, Error)]
pub enum HubError {
    /// The named type does not exist.
    #[error("type not found: {type_name}")]
    TypeNotFound {
        /// Name of the type.
        type_name: String,
    },

    /// The instance does not exist.
    #[error("instance not found: {instance_key} of type {type_name}")]
    InstanceNotFound {
        /// Name of the type.
        type_name: String,
        /// Key of the instance.
        instance_key: String,
    },

    /// An instance with the same key already exists.
    #[error("instance already exists: {instance_key} of type {type_name}")]
    InstanceExists {
        /// Name of the type.
        type_name: String,
        /// Key of the instance.
        instance_key: String,
    },

    /// The instance holds data that is not a property bag.
    #[error("instance {instance_key} of type {type_name} is not a property bag")]
    NotAPropertyBag {
        /// Name of the type.
        type_name: String,
        /// Key of the instance.
        instance_key: String,
    },

    /// A listener refused the proposed change during prepare.
    #[error("commit vetoed by listener: {reason}")]
    Vetoed {
        /// Reason given by the listener.
        reason: String,
    },

    /// The staging closure failed.
    #[error("commit aborted: {reason}")]
    Aborted {
        /// Reason for abort.
        reason: String,
    },
}

impl HubError {
    /// Creates a listener veto error.
    pub fn vetoed(reason: impl Into<String>) -> Self {
        Self::Vetoed {
            reason: reason.into(),
        }
    }

    /// Creates a commit aborted error.
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::Aborted {
            reason: reason.into(),
        }
    }

    /// Creates an instance-not-found error.
    pub fn instance_not_found(type_name: &str, instance_key: &str) -> Self {
        Self::InstanceNotFound {
            type_name: type_name.to_string(),
            instance_key: instance_key.to_string(),
        }
    }
}
