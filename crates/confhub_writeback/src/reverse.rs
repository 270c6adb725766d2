//! Reverse-direction filtering of tree events.

use crate::echo::EchoRegistry;
use confhub_tree::{TreeEvent, TreeListener};
use std::sync::Arc;
use tracing::trace;

/// Forwards only the tree events the writeback engine did not cause.
///
/// Wraps the listener that mirrors tree edits back into the hub. While the
/// engine holds the suppress flag every event is dropped; otherwise events
/// naming a registered known change are dropped individually.
pub struct EchoFilter<L> {
    echo: Arc<EchoRegistry>,
    inner: L,
}

impl<L: TreeListener> EchoFilter<L> {
    /// Wraps `inner`.
    pub fn new(echo: Arc<EchoRegistry>, inner: L) -> Self {
        Self { echo, inner }
    }

    /// Returns the wrapped listener.
    pub fn inner(&self) -> &L {
        &self.inner
    }
}

impl<L: TreeListener> TreeListener for EchoFilter<L> {
    fn tree_changed(&self, events: &[TreeEvent]) {
        if self.echo.is_suppressed() {
            trace!(events = events.len(), "dropping tree events during writeback");
            return;
        }

        let foreign: Vec<TreeEvent> = events
            .iter()
            .filter(|e| !self.echo.is_known_change(e.name()))
            .cloned()
            .collect();
        if foreign.len() < events.len() {
            trace!(dropped = events.len() - foreign.len(), "dropping known tree events");
        }
        if !foreign.is_empty() {
            self.inner.tree_changed(&foreign);
        }
    }
}
