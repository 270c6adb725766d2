//! Wiring of the engine between a hub and a tree.

use crate::config::WritebackConfig;
use crate::echo::EchoRegistry;
use crate::mirror::TreeToHubMirror;
use crate::reconciler::WritebackListener;
use crate::reverse::EchoFilter;
use confhub_hub::Hub;
use confhub_tree::ConfigTree;
use std::sync::Arc;
use tracing::debug;

/// Both directions of a hub/tree link sharing one echo registry.
pub struct Connection {
    /// Hub-to-tree engine registered with the hub.
    pub writeback: Arc<WritebackListener>,
    /// Tree-to-hub mirror registered with the tree.
    pub mirror: Arc<EchoFilter<TreeToHubMirror>>,
    /// Registry shared by both directions.
    pub echo: Arc<EchoRegistry>,
}

/// Registers a writeback listener with `hub` and an echo-filtered mirror
/// with `tree`.
pub fn connect(hub: &Arc<Hub>, tree: &Arc<ConfigTree>, config: WritebackConfig) -> Connection {
    let echo = Arc::new(EchoRegistry::new());

    let writeback = Arc::new(WritebackListener::with_config(
        Arc::clone(tree),
        Arc::clone(&echo),
        config.clone(),
    ));
    hub.register_listener(writeback.clone());

    let mirror = Arc::new(EchoFilter::new(
        Arc::clone(&echo),
        TreeToHubMirror::with_config(hub, tree, config),
    ));
    tree.add_listener(mirror.clone());

    debug!(phase = ?writeback.config().phase, "connected hub and config tree");
    Connection {
        writeback,
        mirror,
        echo,
    }
}
