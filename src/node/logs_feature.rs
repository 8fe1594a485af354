//! # Logs feature.
//!
//! Attaches a [`LogsServer`] to the logs channel and offers the publishing
//! side: [`publish_log`](LogsFeature::publish_log) ships local log lines to
//! the topology.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use crate::error::{BusError, RuntimeError};
use crate::node::{NodeContext, NodeFeature};
use crate::server::LogsServer;

/// Channel carrying log records.
pub const LOGS_CHANNEL: &str = "logs";

/// Loads the logs server onto the logs bus.
pub struct LogsFeature {
    name: String,
    server: Arc<LogsServer>,
    loaded: AtomicBool,
}

impl LogsFeature {
    /// Creates an unloaded logs feature for the given node.
    #[must_use]
    pub fn new(node_name: &str) -> Self {
        Self {
            name: "logs".into(),
            server: Arc::new(LogsServer::new(format!("{node_name}_logs_server"))),
            loaded: AtomicBool::new(false),
        }
    }

    /// The logs server, for inspection.
    #[must_use]
    pub fn server(&self) -> Arc<LogsServer> {
        Arc::clone(&self.server)
    }

    /// Publishes local log lines on the logs bus.
    pub fn publish_log(
        &self,
        ctx: &NodeContext,
        level: &str,
        source: &str,
        lines: Vec<String>,
    ) -> Result<(), BusError> {
        let Some(bus) = ctx.bus("logs_bus") else {
            return Err(BusError::Closed {
                engine: "logs_bus".into(),
            });
        };
        let sender = bus.name().to_string();
        bus.publish(
            LOGS_CHANNEL,
            &sender,
            json!({
                "ts": crate::metrics::epoch_ms(),
                "level": level,
                "source": source,
                "logs": lines,
            }),
        )
    }
}

#[async_trait]
impl NodeFeature for LogsFeature {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&self, ctx: &NodeContext) -> Result<(), RuntimeError> {
        if self.loaded.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let Some(logs_bus) = ctx.bus("logs_bus") else {
            self.loaded.store(false, Ordering::SeqCst);
            return Err(RuntimeError::BusUnavailable {
                feature: self.name.clone(),
                bus: "logs_bus".into(),
            });
        };
        logs_bus
            .msg_register(LOGS_CHANNEL, self.server.clone())
            .map_err(|error| RuntimeError::BusUnavailable {
                feature: self.name.clone(),
                bus: format!("logs_bus ({error})"),
            })?;
        info!(node = ctx.node_name(), "logs feature loaded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EngineRegistry;
    use crate::config::Config;
    use crate::node::BusFeature;
    use std::time::Duration;

    async fn ctx_with_logs_bus() -> NodeContext {
        let mut config = Config::default();
        config.node_name = "node_a".into();
        let ctx = NodeContext::new(Arc::new(config), Arc::new(EngineRegistry::with_builtins()));
        BusFeature::new("logs_bus", vec![LOGS_CHANNEL.into()])
            .load(&ctx)
            .await
            .unwrap();
        ctx
    }

    #[tokio::test]
    async fn test_published_logs_reach_a_peer_server() {
        let ctx = ctx_with_logs_bus().await;
        let feature = LogsFeature::new("node_a");
        feature.load(&ctx).await.unwrap();

        // publish_log sends under the bus unique name, not the server name,
        // so the local server accepts it (peer servers would too).
        feature
            .publish_log(&ctx, "info", "node_a", vec!["booted".into()])
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(feature.server().accepted(), 1);
    }

    #[tokio::test]
    async fn test_load_without_logs_bus_fails() {
        let ctx = NodeContext::new(
            Arc::new(Config::default()),
            Arc::new(EngineRegistry::with_builtins()),
        );
        let feature = LogsFeature::new("node_a");
        assert!(matches!(
            feature.load(&ctx).await.unwrap_err(),
            RuntimeError::BusUnavailable { .. }
        ));
    }
}
