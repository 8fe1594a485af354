//! # Node features and their shared context.
//!
//! A node is assembled from features loaded in order: bus features first
//! (they publish a [`MessageBus`] into the [`NodeContext`]), then the
//! consumers that attach servers and collectors to those buses.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::bus::{EngineRegistry, MessageBus};
use crate::config::Config;
use crate::error::RuntimeError;

/// State shared by the features of one node.
///
/// Buses land here keyed by feature name (`msg_bus`, `metrics_bus`,
/// `logs_bus`); later features look them up by that key.
pub struct NodeContext {
    node_name: String,
    config: Arc<Config>,
    registry: Arc<EngineRegistry>,
    buses: RwLock<HashMap<String, MessageBus>>,
}

impl NodeContext {
    /// Creates a context for one node.
    #[must_use]
    pub fn new(config: Arc<Config>, registry: Arc<EngineRegistry>) -> Self {
        Self {
            node_name: config.node_name.clone(),
            config,
            registry,
            buses: RwLock::new(HashMap::new()),
        }
    }

    /// Owning node's name.
    #[must_use]
    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    /// Runtime configuration.
    #[must_use]
    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// Bus engine registry features resolve against.
    #[must_use]
    pub fn registry(&self) -> &Arc<EngineRegistry> {
        &self.registry
    }

    /// Looks up a loaded bus by its feature name.
    #[must_use]
    pub fn bus(&self, feature: &str) -> Option<MessageBus> {
        let buses = self.buses.read().unwrap_or_else(|p| p.into_inner());
        buses.get(feature).cloned()
    }

    /// Publishes a loaded bus under its feature name.
    pub fn insert_bus(&self, feature: impl Into<String>, bus: MessageBus) {
        let mut buses = self.buses.write().unwrap_or_else(|p| p.into_inner());
        buses.insert(feature.into(), bus);
    }

    /// Every loaded bus, in no particular order.
    #[must_use]
    pub fn all_buses(&self) -> Vec<MessageBus> {
        let buses = self.buses.read().unwrap_or_else(|p| p.into_inner());
        buses.values().cloned().collect()
    }
}

/// One loadable capability of a node.
///
/// ## Rules
/// - `load()` is idempotent: a second call must not duplicate resources.
/// - A feature that needs a bus fails its load with
///   [`RuntimeError::BusUnavailable`] instead of creating one implicitly.
#[async_trait]
pub trait NodeFeature: Send + Sync {
    /// Feature name; bus features use it as the context key.
    fn name(&self) -> &str;

    /// Acquires the feature's resources.
    async fn load(&self, ctx: &NodeContext) -> Result<(), RuntimeError>;

    /// Begins active work (timers, servers). Default: no-op.
    async fn start(&self, _ctx: &NodeContext) -> Result<(), RuntimeError> {
        Ok(())
    }

    /// Stops active work. Default: no-op.
    async fn stop(&self, _ctx: &NodeContext) -> Result<(), RuntimeError> {
        Ok(())
    }
}
