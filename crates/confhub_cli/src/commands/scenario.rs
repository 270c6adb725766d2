//! Scenario file format.
//!
//! A scenario declares a schema, one bound root and a list of commits:
//!
//! ```json
//! {
//!   "schema": [{"type_name": "Domain", "properties": []}],
//!   "root": {"type_name": "Domain", "hub_type": "/domain", "key": "domain"},
//!   "phase": "prepare",
//!   "commits": [
//!     {"name": "add", "ops": [{"op": "add", "type_name": "/domain/server", "key": "domain.s1"}]}
//!   ]
//! }
//! ```

use super::error::{CliError, CliResult};
use confhub_hub::{HubResult, HubWriter, PropertyBag, Value};
use confhub_tree::NodeModel;
use confhub_writeback::PropagationPhase;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// A full replay scenario.
#[derive(Debug, Deserialize)]
pub struct Scenario {
    /// Node models of the tree schema.
    pub schema: Vec<NodeModel>,
    /// Root node and the hub instance bound to it.
    pub root: RootSpec,
    /// Commit phase that triggers propagation.
    #[serde(default)]
    pub phase: Phase,
    /// Commits replayed in order.
    #[serde(default)]
    pub commits: Vec<CommitSpec>,
}

impl Scenario {
    /// Loads a scenario from a JSON file.
    pub fn load(path: &Path) -> CliResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| CliError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// The tree root and its hub instance.
#[derive(Debug, Deserialize)]
pub struct RootSpec {
    /// Tree type of the root node.
    pub type_name: String,
    /// Attributes of the root node.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Hub type of the bound instance.
    pub hub_type: String,
    /// Hub key of the bound instance.
    pub key: String,
    /// Initial properties of the bound instance.
    #[serde(default)]
    pub properties: PropertyBag,
}

/// Propagation phase as written in scenario files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Propagate while the hub prepares.
    #[default]
    Prepare,
    /// Propagate after the hub commits.
    Commit,
}

impl From<Phase> for PropagationPhase {
    fn from(phase: Phase) -> Self {
        match phase {
            Phase::Prepare => PropagationPhase::Prepare,
            Phase::Commit => PropagationPhase::Commit,
        }
    }
}

/// One hub commit.
#[derive(Debug, Deserialize)]
pub struct CommitSpec {
    /// Label used in the output.
    #[serde(default)]
    pub name: Option<String>,
    /// Writes applied in order inside the commit.
    pub ops: Vec<Op>,
}

/// A single hub write.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    /// Add an instance.
    Add {
        /// Hub type.
        type_name: String,
        /// Instance key.
        key: String,
        /// Initial properties.
        #[serde(default)]
        properties: PropertyBag,
    },
    /// Replace an instance's properties.
    Modify {
        /// Hub type.
        type_name: String,
        /// Instance key.
        key: String,
        /// New properties.
        properties: PropertyBag,
    },
    /// Set one property.
    Set {
        /// Hub type.
        type_name: String,
        /// Instance key.
        key: String,
        /// Property name.
        property: String,
        /// New value.
        value: Value,
    },
    /// Remove an instance.
    Remove {
        /// Hub type.
        type_name: String,
        /// Instance key.
        key: String,
    },
    /// Remove a type with all its instances.
    RemoveType {
        /// Hub type.
        type_name: String,
    },
}

impl Op {
    /// Applies the write to a hub commit.
    pub fn apply(&self, w: &mut HubWriter) -> HubResult<()> {
        match self {
            Op::Add {
                type_name,
                key,
                properties,
            } => {
                w.add_instance(type_name, key, properties.clone())?;
            }
            Op::Modify {
                type_name,
                key,
                properties,
            } => {
                w.modify_instance(type_name, key, properties.clone())?;
            }
            Op::Set {
                type_name,
                key,
                property,
                value,
            } => {
                w.set_property(type_name, key, property, value.clone())?;
            }
            Op::Remove { type_name, key } => {
                w.remove_instance(type_name, key)?;
            }
            Op::RemoveType { type_name } => w.remove_type(type_name)?,
        }
        Ok(())
    }
}
