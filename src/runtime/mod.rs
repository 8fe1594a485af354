//! # The runtime: staged boot over a SEQUENCE transaction.
//!
//! ```text
//! Runtime::load()
//!   └─ Transaction("runtime", "boot", SEQUENCE)
//!        ├─ stage_0_config    validate configuration, seed the context
//!        ├─ stage_1_topology  read + parse + validate the topology document
//!        ├─ stage_2_node      build the node, load its buses
//!        └─ stage_3_services  load metrics/logs features, start, register
//! ```
//!
//! Boot success is the transaction's resolved boolean; a `false` means the
//! process must not proceed to serving. Stage failures surface as recorded
//! step results, logged with stage name and reason.

mod stages;

pub use stages::boot_stages;

use std::sync::{Arc, RwLock};

use tracing::{error, info};

use crate::bus::EngineRegistry;
use crate::config::Config;
use crate::exec::ExecContext;
use crate::metrics::runtime_uid;
use crate::node::Node;
use crate::topology::Topology;
use crate::transaction::{Transaction, TxType};

/// Shared runtime state, constructed once at process start and passed by
/// handle to every component. Stages fill the topology and node slots.
pub struct RuntimeContext {
    config: Arc<Config>,
    registry: Arc<EngineRegistry>,
    uid: String,
    topology: RwLock<Option<Topology>>,
    node: RwLock<Option<Arc<Node>>>,
}

impl RuntimeContext {
    /// Creates a context with the built-in engine registry.
    #[must_use]
    pub fn new(config: Config) -> Arc<Self> {
        Self::with_registry(config, Arc::new(EngineRegistry::with_builtins()))
    }

    /// Creates a context with a caller-provided engine registry (custom
    /// engine packages registered ahead of boot).
    #[must_use]
    pub fn with_registry(config: Config, registry: Arc<EngineRegistry>) -> Arc<Self> {
        Arc::new(Self {
            config: Arc::new(config),
            registry,
            uid: runtime_uid(),
            topology: RwLock::new(None),
            node: RwLock::new(None),
        })
    }

    /// Runtime configuration.
    #[must_use]
    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// Bus engine registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<EngineRegistry> {
        &self.registry
    }

    /// Process-unique runtime id (`<hostname>_<pid>`).
    #[must_use]
    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// Stores the parsed topology (stage 1).
    pub fn set_topology(&self, topology: Topology) {
        let mut slot = self.topology.write().unwrap_or_else(|p| p.into_inner());
        *slot = Some(topology);
    }

    /// The parsed topology, once stage 1 has run.
    #[must_use]
    pub fn topology(&self) -> Option<Topology> {
        let slot = self.topology.read().unwrap_or_else(|p| p.into_inner());
        slot.clone()
    }

    /// Stores the built node (stage 2).
    pub fn set_node(&self, node: Arc<Node>) {
        let mut slot = self.node.write().unwrap_or_else(|p| p.into_inner());
        *slot = Some(node);
    }

    /// The node, once stage 2 has run.
    #[must_use]
    pub fn node(&self) -> Option<Arc<Node>> {
        let slot = self.node.read().unwrap_or_else(|p| p.into_inner());
        slot.clone()
    }
}

impl std::fmt::Debug for RuntimeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeContext")
            .field("uid", &self.uid)
            .field("node_name", &self.config.node_name)
            .finish_non_exhaustive()
    }
}

/// The node runtime: boots via the staged transaction, tears down the node.
pub struct Runtime {
    context: Arc<RuntimeContext>,
}

impl Runtime {
    /// Creates a runtime for the given configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            context: RuntimeContext::new(config),
        }
    }

    /// Creates a runtime over an existing context.
    #[must_use]
    pub fn with_context(context: Arc<RuntimeContext>) -> Self {
        Self { context }
    }

    /// The runtime context.
    #[must_use]
    pub fn context(&self) -> &Arc<RuntimeContext> {
        &self.context
    }

    /// The booted node, after a successful [`load`](Runtime::load).
    #[must_use]
    pub fn node(&self) -> Option<Arc<Node>> {
        self.context.node()
    }

    /// Runs the four boot stages as one SEQUENCE transaction.
    ///
    /// Returns `true` when every stage succeeded and the node is serving.
    /// All stage failures are recorded and logged; none panic the process.
    pub async fn load(&self) -> bool {
        let node_name = self.context.config().node_name.clone();
        info!(node = %node_name, uid = self.context.uid(), "boot starting");

        let mut tx = Transaction::new(
            "runtime",
            &node_name,
            "staged_boot",
            boot_stages(),
            TxType::Sequence,
        );
        let ctx = ExecContext::new(Arc::clone(&self.context));
        if let Err(err) = tx.prepare(&ctx) {
            error!(node = %node_name, error = %err, "boot preparation failed");
            return false;
        }

        let ok = tx.execute(None).await;
        if ok {
            info!(node = %node_name, "boot complete");
        } else {
            for step in tx.results().iter().filter(|s| s.has_error) {
                error!(
                    node = %node_name,
                    stage = step.index,
                    reason = step.error_msg.as_deref().unwrap_or("unknown"),
                    "boot stage failed"
                );
            }
            // A later stage may have failed after the node came up.
            if let Some(node) = self.context.node() {
                node.stop().await;
            }
        }
        ok
    }

    /// Stops the node, if boot got far enough to create one.
    pub async fn stop(&self) {
        if let Some(node) = self.context.node() {
            node.stop().await;
        }
        info!(uid = self.context.uid(), "runtime stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeState;
    use serde_json::json;

    fn master_config() -> Config {
        let mut config = Config::default();
        config.node_name = "master".into();
        config.is_master = true;
        config.topology = crate::config::TopologySource::Inline(json!({
            "name": "world",
            "nodes": {"master": {"host": "localhost", "is_master": true}},
        }));
        config
    }

    #[tokio::test]
    async fn test_boot_succeeds_and_starts_the_node() {
        let runtime = Runtime::new(master_config());
        assert!(runtime.load().await);

        let node = runtime.node().expect("node created");
        assert_eq!(node.state(), NodeState::Started);
        assert!(runtime.context().topology().is_some());

        runtime.stop().await;
        assert_eq!(node.state(), NodeState::Stopped);
    }

    #[tokio::test]
    async fn test_boot_fails_on_invalid_config() {
        let mut config = master_config();
        config.node_name = String::new();
        let runtime = Runtime::new(config);
        assert!(!runtime.load().await);
        // No node is left serving after a failed boot.
        if let Some(node) = runtime.node() {
            assert_ne!(node.state(), NodeState::Started);
        }
    }

    #[tokio::test]
    async fn test_boot_fails_on_invalid_topology() {
        let mut config = master_config();
        config.topology = crate::config::TopologySource::Inline(json!({
            "nodes": {
                "a": {"is_master": true},
                "b": {"is_master": true},
            }
        }));
        let runtime = Runtime::new(config);
        assert!(!runtime.load().await);
        // Stage 1 failed; stage 2 never created the node.
        assert!(runtime.node().is_none());
    }

    #[tokio::test]
    async fn test_worker_without_master_name_fails_stage_0() {
        let mut config = master_config();
        config.is_master = false;
        config.master.name = None;
        let runtime = Runtime::new(config);
        assert!(!runtime.load().await);
    }
}
