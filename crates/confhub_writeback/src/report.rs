//! Outcome of one reconciliation pass.

use crate::error::WritebackError;
use confhub_tree::TreeError;

/// A change that could not be propagated.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeFailure {
    /// Rendered change, e.g. `AddInstance(/domain/server, domain.s1)`.
    pub change: String,
    /// Why it failed.
    pub error: WritebackError,
}

/// A single property write the tree refused.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyFailure {
    /// Type name of the instance.
    pub type_name: String,
    /// Instance key.
    pub instance_key: String,
    /// Generic property name (or side-table entry name).
    pub property: String,
    /// Error returned by the tree.
    pub error: TreeError,
}

impl PropertyFailure {
    /// Returns true if a validator or the schema rejected the value.
    pub fn is_rejection(&self) -> bool {
        self.error.is_rejection()
    }
}

/// Counts and failures of one pass over a hub batch.
///
/// Failures never stop a pass; the tree may be partially updated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileReport {
    /// Changes that mutated the tree.
    pub applied: usize,
    /// Changes with nothing to propagate.
    pub skipped: usize,
    /// Changes abandoned with an error.
    pub failures: Vec<ChangeFailure>,
    /// Property writes refused inside otherwise applied modifies.
    pub property_failures: Vec<PropertyFailure>,
}

impl ReconcileReport {
    /// Returns true if nothing failed.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.property_failures.is_empty()
    }

    /// Returns the number of changes visited.
    pub fn visited(&self) -> usize {
        self.applied + self.skipped + self.failures.len()
    }

    /// Returns the failures caused by broken preconditions.
    pub fn fatal_failures(&self) -> impl Iterator<Item = &ChangeFailure> {
        self.failures.iter().filter(|f| f.error.is_fatal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts() {
        let mut report = ReconcileReport::default();
        assert!(report.is_clean());

        report.applied = 2;
        report.skipped = 1;
        report.failures.push(ChangeFailure {
            change: "AddInstance(/domain/server, domain.s1)".into(),
            error: WritebackError::missing_metadata("/domain", "domain"),
        });
        report.failures.push(ChangeFailure {
            change: "RemoveInstance(/domain/server, domain.s2)".into(),
            error: WritebackError::Apply(TreeError::aborted("io")),
        });

        assert!(!report.is_clean());
        assert_eq!(report.visited(), 5);
        assert_eq!(report.fatal_failures().count(), 1);
    }
}
