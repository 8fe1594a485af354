//! # The node: features assembled over shared buses.
//!
//! ```text
//! Node
//!  ├─ BusFeature "msg_bus"      channel "msg"      (node-to-node actions)
//!  ├─ BusFeature "metrics_bus"  channel "metrics"  (metrics records)
//!  ├─ BusFeature "logs_bus"     channel "logs"     (log records)
//!  ├─ MetricsFeature            collectors + metrics server
//!  └─ LogsFeature               logs server + log publishing
//! ```
//!
//! Features load in declaration order (buses before their consumers),
//! start in the same order, and stop in reverse.

mod bus_feature;
mod feature;
mod logs_feature;
mod metrics_feature;

pub use bus_feature::BusFeature;
pub use feature::{NodeContext, NodeFeature};
pub use logs_feature::{LogsFeature, LOGS_CHANNEL};
pub use metrics_feature::{MetricsFeature, METRICS_CHANNEL};

use std::sync::{Arc, Mutex};

use serde_json::json;
use tracing::{info, warn};

use crate::bus::{EngineRegistry, MessageBus};
use crate::config::Config;
use crate::error::{BusError, RuntimeError};
use crate::metrics::{hostname, runtime_uid};

/// Channel carrying node-to-node action messages.
pub const MSG_CHANNEL: &str = "msg";

/// Action name of the worker-to-master registration message.
pub const ACTION_REGISTERING: &str = "NODE_ACTION_REGISTERING";

/// Node lifecycle state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NodeState {
    /// Built, no features loaded.
    #[default]
    Created,
    /// All features loaded.
    Loaded,
    /// Features started (timers running, servers attached).
    Started,
    /// Features stopped.
    Stopped,
}

/// One runtime node with its standard feature set.
pub struct Node {
    name: String,
    context: Arc<NodeContext>,
    bus_features: Vec<Arc<dyn NodeFeature>>,
    service_features: Vec<Arc<dyn NodeFeature>>,
    metrics: Arc<MetricsFeature>,
    logs: Arc<LogsFeature>,
    state: Mutex<NodeState>,
}

impl Node {
    /// Assembles a node with the standard features for the given
    /// configuration.
    #[must_use]
    pub fn new(config: Arc<Config>, registry: Arc<EngineRegistry>) -> Self {
        let name = config.node_name.clone();
        let context = Arc::new(NodeContext::new(config, registry));
        let metrics = Arc::new(MetricsFeature::new(&name));
        let logs = Arc::new(LogsFeature::new(&name));
        let bus_features: Vec<Arc<dyn NodeFeature>> = vec![
            Arc::new(BusFeature::new("msg_bus", vec![MSG_CHANNEL.into()])),
            Arc::new(BusFeature::new("metrics_bus", vec![METRICS_CHANNEL.into()])),
            Arc::new(BusFeature::new("logs_bus", vec![LOGS_CHANNEL.into()])),
        ];
        let service_features: Vec<Arc<dyn NodeFeature>> =
            vec![metrics.clone(), logs.clone()];
        Self {
            name,
            context,
            bus_features,
            service_features,
            metrics,
            logs,
            state: Mutex::new(NodeState::Created),
        }
    }

    fn features(&self) -> impl Iterator<Item = &Arc<dyn NodeFeature>> {
        self.bus_features.iter().chain(self.service_features.iter())
    }

    /// Node name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this node is the topology master.
    #[must_use]
    pub fn is_master(&self) -> bool {
        self.context.config().is_master
    }

    /// Shared feature context.
    #[must_use]
    pub fn context(&self) -> &Arc<NodeContext> {
        &self.context
    }

    /// Looks up a loaded bus by feature name.
    #[must_use]
    pub fn bus(&self, feature: &str) -> Option<MessageBus> {
        self.context.bus(feature)
    }

    /// The node-action bus, once loaded.
    #[must_use]
    pub fn msg_bus(&self) -> Option<MessageBus> {
        self.bus("msg_bus")
    }

    /// The metrics bus, once loaded.
    #[must_use]
    pub fn metrics_bus(&self) -> Option<MessageBus> {
        self.bus("metrics_bus")
    }

    /// The logs bus, once loaded.
    #[must_use]
    pub fn logs_bus(&self) -> Option<MessageBus> {
        self.bus("logs_bus")
    }

    /// The metrics feature, for state queries and HTTP monitoring.
    #[must_use]
    pub fn metrics(&self) -> &Arc<MetricsFeature> {
        &self.metrics
    }

    /// The logs feature, for log publishing.
    #[must_use]
    pub fn logs(&self) -> &Arc<LogsFeature> {
        &self.logs
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> NodeState {
        *self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn set_state(&self, state: NodeState) {
        *self.state.lock().unwrap_or_else(|p| p.into_inner()) = state;
    }

    /// Loads the three bus features, making the buses available in the
    /// context.
    pub async fn load_buses(&self) -> Result<(), RuntimeError> {
        for feature in &self.bus_features {
            feature.load(&self.context).await?;
        }
        Ok(())
    }

    /// Loads the metrics and logs features; requires the buses.
    pub async fn load_services(&self) -> Result<(), RuntimeError> {
        for feature in &self.service_features {
            feature.load(&self.context).await?;
        }
        self.set_state(NodeState::Loaded);
        info!(node = %self.name, "node loaded");
        Ok(())
    }

    /// Loads every feature in order. Fails on the first feature error.
    pub async fn load(&self) -> Result<(), RuntimeError> {
        self.load_buses().await?;
        self.load_services().await
    }

    /// Starts every feature in order.
    pub async fn start(&self) -> Result<(), RuntimeError> {
        for feature in self.features() {
            feature.start(&self.context).await?;
        }
        self.set_state(NodeState::Started);
        info!(node = %self.name, "node started");
        Ok(())
    }

    /// Stops features in reverse order. Failures are logged, not
    /// propagated: shutdown always completes.
    pub async fn stop(&self) {
        let features: Vec<_> = self.features().cloned().collect();
        for feature in features.iter().rev() {
            if let Err(error) = feature.stop(&self.context).await {
                warn!(node = %self.name, feature = feature.name(), %error, "feature stop failed");
            }
        }
        self.set_state(NodeState::Stopped);
        info!(node = %self.name, "node stopped");
    }

    /// Announces this node to its master over the msg bus.
    ///
    /// Returns `false` without publishing when this node is the master.
    pub fn register_to_master(&self) -> Result<bool, BusError> {
        let config = self.context.config();
        if config.is_master {
            return Ok(false);
        }
        let Some(bus) = self.context.bus("msg_bus") else {
            return Err(BusError::Closed {
                engine: "msg_bus".into(),
            });
        };
        let sender = bus.name().to_string();
        bus.publish(
            MSG_CHANNEL,
            &sender,
            json!({
                "action": ACTION_REGISTERING,
                "node": {
                    "name": self.name,
                    "hostname": hostname(),
                    "runtime_uid": runtime_uid(),
                    "is_master": false,
                    "master": config.master_name(),
                },
            }),
        )?;
        info!(node = %self.name, master = ?config.master_name(), "registration sent");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(is_master: bool) -> Node {
        let mut config = Config::default();
        config.node_name = "node_a".into();
        config.is_master = is_master;
        if !is_master {
            config.master.name = Some("master".into());
        }
        Node::new(Arc::new(config), Arc::new(EngineRegistry::with_builtins()))
    }

    #[tokio::test]
    async fn test_full_lifecycle() {
        let node = node(true);
        assert_eq!(node.state(), NodeState::Created);

        node.load().await.unwrap();
        assert_eq!(node.state(), NodeState::Loaded);
        assert!(node.bus("msg_bus").is_some());
        assert!(node.bus("metrics_bus").is_some());
        assert!(node.bus("logs_bus").is_some());

        node.start().await.unwrap();
        assert_eq!(node.state(), NodeState::Started);

        node.stop().await;
        assert_eq!(node.state(), NodeState::Stopped);
    }

    #[tokio::test]
    async fn test_master_does_not_register_to_itself() {
        let node = node(true);
        node.load().await.unwrap();
        assert!(!node.register_to_master().unwrap());
        assert_eq!(node.bus("msg_bus").unwrap().drain_counters().msg_count, 0);
    }

    #[tokio::test]
    async fn test_worker_registration_carries_the_action() {
        let node = node(false);
        node.load().await.unwrap();

        use crate::bus::{BusMessage, Receive};
        use async_trait::async_trait;

        struct Probe(Mutex<Vec<BusMessage>>);
        #[async_trait]
        impl Receive for Probe {
            fn name(&self) -> &str {
                "probe"
            }
            async fn on_message(&self, msg: &BusMessage) {
                self.0.lock().unwrap().push(msg.clone());
            }
        }

        let bus = node.bus("msg_bus").unwrap();
        let probe = Arc::new(Probe(Mutex::new(Vec::new())));
        bus.msg_register(MSG_CHANNEL, probe.clone()).unwrap();

        assert!(node.register_to_master().unwrap());
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let got = probe.0.lock().unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].payload["action"], ACTION_REGISTERING);
        assert_eq!(got[0].payload["node"]["name"], "node_a");
        assert_eq!(got[0].payload["node"]["master"], "master");
    }
}
