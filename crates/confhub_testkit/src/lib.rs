//! # Confhub Testkit
//!
//! Test utilities for confhub.
//!
//! This crate provides:
//! - A sample schema and a wired hub + tree + writeback fixture
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use confhub_testkit::prelude::*;
//!
//! #[test]
//! fn server_reaches_the_tree() {
//!     let fx = Fixture::new();
//!     fx.add_server("s1", &[("port", Value::from(80))]).unwrap();
//!     assert!(fx.node_of(SERVER_TYPE, "domain.s1").is_some());
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use confhub_hub::{CommitOrigin, PropertyBag, Value};
}

pub use fixtures::*;
pub use generators::*;
