//! Replay command implementation.

use super::error::{CliError, CliResult};
use super::scenario::Scenario;
use confhub_hub::{CommitOrigin, Hub, InstanceLookup};
use confhub_tree::{ConfigTree, Schema};
use confhub_writeback::{bind, connect, ReconcileReport, WritebackConfig};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Result of replaying one commit.
#[derive(Debug, Serialize)]
pub struct CommitSummary {
    /// Commit label.
    pub commit: String,
    /// Hub version after the commit.
    pub version: u64,
    /// Number of changes the hub published.
    pub changes: usize,
    /// Changes written into the tree.
    pub applied: usize,
    /// Changes with nothing to write.
    pub skipped: usize,
    /// Abandoned changes, rendered.
    pub failures: Vec<String>,
    /// Refused property writes, rendered.
    pub rejected: Vec<String>,
    /// Hub error, if the commit itself failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommitSummary {
    fn new(commit: String, version: u64, changes: usize, report: ReconcileReport) -> Self {
        Self {
            commit,
            version,
            changes,
            applied: report.applied,
            skipped: report.skipped,
            failures: report
                .failures
                .iter()
                .map(|f| format!("{}: {}", f.change, f.error))
                .collect(),
            rejected: report
                .property_failures
                .iter()
                .map(|f| format!("{}[{}].{}: {}", f.type_name, f.instance_key, f.property, f.error))
                .collect(),
            error: None,
        }
    }
}

/// Replay result.
#[derive(Debug, Serialize)]
pub struct ReplayResult {
    /// Rendered tree after the last commit.
    pub tree: String,
    /// One entry per commit.
    pub commits: Vec<CommitSummary>,
}

/// Replays `scenario` against a fresh hub and tree.
///
/// Failing commits are recorded in their summary; the replay continues.
pub fn replay(scenario: &Scenario) -> CliResult<ReplayResult> {
    let schema = Schema::from_models(scenario.schema.iter().cloned());
    let tree = Arc::new(ConfigTree::new(Arc::new(schema)));
    let root = tree.create_root(&scenario.root.type_name, &scenario.root.attributes)?;

    let hub = Arc::new(Hub::new());
    hub.commit(CommitOrigin::Named("bootstrap".into()), |w| {
        w.add_instance(
            &scenario.root.hub_type,
            &scenario.root.key,
            scenario.root.properties.clone(),
        )?;
        Ok(())
    })?;
    if let Some(instance) = hub.snapshot().instance(&scenario.root.hub_type, &scenario.root.key) {
        bind(&instance, root);
    }

    let config = WritebackConfig::default().phase(scenario.phase.into());
    let link = connect(&hub, &tree, config);

    let mut commits = Vec::with_capacity(scenario.commits.len());
    for (index, spec) in scenario.commits.iter().enumerate() {
        let label = spec.name.clone().unwrap_or_else(|| format!("#{}", index + 1));
        let result = hub.commit(CommitOrigin::Named(label.clone()), |w| {
            spec.ops.iter().try_for_each(|op| op.apply(w))
        });
        // Prepare-phase propagation may have run even if the commit failed
        let report = link.writeback.take_report().unwrap_or_default();
        let summary = match result {
            Ok(outcome) => CommitSummary::new(label, outcome.version, outcome.changes.len(), report),
            Err(error) => {
                warn!(commit = %label, %error, "commit failed");
                let mut summary = CommitSummary::new(label, hub.snapshot().version(), 0, report);
                summary.error = Some(error.to_string());
                summary
            }
        };
        info!(
            commit = %summary.commit,
            applied = summary.applied,
            failures = summary.failures.len() + summary.rejected.len(),
            "replayed commit"
        );
        commits.push(summary);
    }

    Ok(ReplayResult {
        tree: tree.render(root),
        commits,
    })
}

/// Runs the replay command.
pub fn run(path: &Path, format: &str) -> CliResult<()> {
    let scenario = Scenario::load(path)?;
    let result = replay(&scenario)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        "text" => print_text_output(&result),
        other => return Err(CliError::Format(other.to_string())),
    }
    Ok(())
}

fn print_text_output(result: &ReplayResult) {
    println!("=== Commits ===");
    for c in &result.commits {
        println!(
            "{} (v{}): {} changes, {} applied, {} skipped",
            c.commit, c.version, c.changes, c.applied, c.skipped
        );
        if let Some(error) = &c.error {
            println!("  error: {error}");
        }
        for f in c.failures.iter().chain(&c.rejected) {
            println!("  failed: {f}");
        }
    }
    println!();
    println!("=== Tree ===");
    print!("{}", result.tree);
}
