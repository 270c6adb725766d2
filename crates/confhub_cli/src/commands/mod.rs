//! CLI command implementations.

pub mod error;
pub mod replay;
pub mod scenario;
