//! # Confhub Hub
//!
//! Versioned, in-memory database of typed instances.
//!
//! This crate provides:
//! - A generic property bag (`Value`, `PropertyBag`) for instance data
//! - `Instance` with an opaque metadata slot owned by integrations
//! - The `Change` vocabulary emitted for every commit
//! - Immutable `HubSnapshot`s and the `Hub` with two-phase commit
//!
//! ## Commit protocol
//!
//! Writes are staged on a copy of the current snapshot. Every registered
//! `HubListener` is asked to `prepare` the resulting change list; if any
//! listener refuses, all listeners receive `rollback` and the hub keeps
//! its previous snapshot. Otherwise the proposed snapshot becomes current
//! and listeners receive `commit`.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change;
mod error;
mod hub;
mod instance;
mod snapshot;
mod value;

pub use change::{Change, ChangeCategory, PropertyChange};
pub use error::{HubError, HubResult};
pub use hub::{CommitOrigin, CommitOutcome, Hub, HubListener, HubWriter};
pub use instance::{Bean, Instance, Metadata};
pub use snapshot::{HubSnapshot, InstanceLookup};
pub use value::{PropertyBag, Value, ValueKind};
