//! CLI error types.

use confhub_hub::HubError;
use confhub_tree::TreeError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for CLI commands.
pub type CliResult<T> = Result<T, CliError>;

/// Errors raised while loading or replaying a scenario.
#[derive(Debug, Error)]
pub enum CliError {
    /// The scenario file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// File that was read.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The scenario is not valid JSON or has the wrong shape.
    #[error("invalid scenario: {0}")]
    Parse(#[from] serde_json::Error),

    /// The scenario's root could not be created.
    #[error("failed to build root: {0}")]
    Tree(#[from] TreeError),

    /// The root instance could not be committed.
    #[error("failed to bootstrap hub: {0}")]
    Hub(#[from] HubError),

    /// Unsupported output format.
    #[error("unknown output format: {0}")]
    Format(String),
}
