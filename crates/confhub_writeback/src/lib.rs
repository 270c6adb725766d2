//! # Confhub Writeback
//!
//! Keeps a config tree in step with the hub.
//!
//! This crate provides:
//! - `WritebackListener`, a hub listener that applies every committed
//!   instance change to the tree
//! - Change ordering, path parsing and schema lookup used by the listener
//! - `EchoRegistry`, the shared state that stops the engine's own tree
//!   writes from flowing back into the hub
//! - `EchoFilter` and `TreeToHubMirror` for the reverse direction
//!
//! ## Usage
//!
//! ```rust,ignore
//! use confhub_writeback::{bind, connect, WritebackConfig};
//!
//! let link = connect(&hub, &tree, WritebackConfig::default());
//! bind(&hub.snapshot().instance("/domain", "domain").unwrap(), root);
//!
//! hub.commit(CommitOrigin::Local, |w| {
//!     w.add_instance("/domain/server", "domain.s1", bag)?;
//!     Ok(())
//! })?;
//! ```
//!
//! ## Failure model
//!
//! Every change of a batch is handled on its own. Broken preconditions
//! (an unbound parent, a malformed path) abandon that change; a value the
//! tree rejects abandons only that property. Failures are logged and
//! collected in a `ReconcileReport`; they never fail the hub commit.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod binding;
mod config;
mod connect;
mod echo;
mod error;
mod lookup;
mod mirror;
mod ordering;
mod path;
mod reconciler;
mod report;
mod reverse;

pub use binding::{bind, binding, unbind, TreeBinding};
pub use config::{PropagationPhase, WritebackConfig};
pub use connect::{connect, Connection};
pub use echo::{EchoRegistry, KnownChangeGuard, SuppressGuard};
pub use error::{WritebackError, WritebackResult};
pub use lookup::{NameTable, SchemaLookup, SetterResolution, SlotResolution};
pub use mirror::TreeToHubMirror;
pub use ordering::{order_changes, ChangeOrderKey};
pub use path::ChangePath;
pub use reconciler::{ChangeOutcome, WritebackListener};
pub use report::{ChangeFailure, PropertyFailure, ReconcileReport};
pub use reverse::EchoFilter;
