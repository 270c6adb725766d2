//! # Confhub Tree
//!
//! Schema-validated configuration tree.
//!
//! This crate provides:
//! - A `Schema` of `NodeModel`s describing attributes and child slots
//! - `ConfigTree`, a tree of keyed nodes mutated through transactions
//! - `Validator` hooks that veto individual mutations
//! - `TreeEvent` notifications delivered after each committed transaction
//!
//! ## Transactions
//!
//! ```rust,ignore
//! tree.transaction(|txn| {
//!     let server = txn.add_child(root, "server", "Server", &attributes)?;
//!     txn.set_attribute(server, "port", Some("8080"))?;
//!     Ok(server)
//! })?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod event;
mod node;
mod schema;
mod tree;
mod validator;

pub use config::TreeConfig;
pub use error::{TreeError, TreeResult};
pub use event::{TreeEvent, TreeListener};
pub use node::{Node, NodeId};
pub use schema::{
    camel_to_xml, AttributeKind, NodeModel, PropertyKind, PropertyModel, Schema, PROPERTY_ELEMENT,
    PROPERTY_TYPE, WILDCARD,
};
pub use tree::{ConfigTree, TreeTransaction};
pub use validator::{ProposedChange, Validator};
