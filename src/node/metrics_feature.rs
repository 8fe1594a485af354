//! # Metrics feature.
//!
//! Wires the whole metrics pipeline onto the node's metrics bus: builds the
//! four collectors, registers them on a [`MetricsServer`], attaches the
//! server to the metrics channel, and drives sampling with one
//! [`CollectorTimer`] per collector.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::info;

use crate::error::RuntimeError;
use crate::metrics::{
    BusCollector, Collector, CollectorTimer, HostCollector, HttpCollector, ProcessCollector,
};
use crate::node::{NodeContext, NodeFeature};
use crate::server::MetricsServer;

/// Channel carrying metrics records.
pub const METRICS_CHANNEL: &str = "metrics";

/// Loads collectors and the metrics server onto the metrics bus.
pub struct MetricsFeature {
    name: String,
    server: Arc<MetricsServer>,
    collectors: Mutex<Vec<Arc<dyn Collector>>>,
    http: Mutex<Option<Arc<HttpCollector>>>,
    timers: Mutex<Vec<CollectorTimer>>,
    loaded: AtomicBool,
}

impl MetricsFeature {
    /// Creates an unloaded metrics feature for the given node.
    #[must_use]
    pub fn new(node_name: &str) -> Self {
        Self {
            name: "metrics".into(),
            server: Arc::new(MetricsServer::new(format!("{node_name}_metrics_server"))),
            collectors: Mutex::new(Vec::new()),
            http: Mutex::new(None),
            timers: Mutex::new(Vec::new()),
            loaded: AtomicBool::new(false),
        }
    }

    /// The metrics server, for state queries.
    #[must_use]
    pub fn server(&self) -> Arc<MetricsServer> {
        Arc::clone(&self.server)
    }

    /// The HTTP collector, for services to register against. `None` before
    /// load.
    #[must_use]
    pub fn http_collector(&self) -> Option<Arc<HttpCollector>> {
        let http = self.http.lock().unwrap_or_else(|p| p.into_inner());
        http.clone()
    }
}

#[async_trait]
impl NodeFeature for MetricsFeature {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&self, ctx: &NodeContext) -> Result<(), RuntimeError> {
        if self.loaded.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let Some(metrics_bus) = ctx.bus("metrics_bus") else {
            self.loaded.store(false, Ordering::SeqCst);
            return Err(RuntimeError::BusUnavailable {
                feature: self.name.clone(),
                bus: "metrics_bus".into(),
            });
        };

        let sender = metrics_bus.name().to_string();
        let bus_collector = Arc::new(BusCollector::new(
            sender.clone(),
            metrics_bus.clone(),
            METRICS_CHANNEL,
            ctx.all_buses(),
        ));
        let host_collector = Arc::new(HostCollector::new(
            sender.clone(),
            metrics_bus.clone(),
            METRICS_CHANNEL,
        ));
        let process_collector = Arc::new(ProcessCollector::new(
            sender.clone(),
            metrics_bus.clone(),
            METRICS_CHANNEL,
        ));
        let http_collector = Arc::new(HttpCollector::new(
            sender,
            metrics_bus.clone(),
            METRICS_CHANNEL,
        ));

        let all: Vec<Arc<dyn Collector>> = vec![
            bus_collector,
            host_collector,
            process_collector,
            http_collector.clone(),
        ];
        for collector in &all {
            self.server.register_collector(Arc::clone(collector));
        }
        {
            let mut collectors = self.collectors.lock().unwrap_or_else(|p| p.into_inner());
            *collectors = all;
        }
        {
            let mut http = self.http.lock().unwrap_or_else(|p| p.into_inner());
            *http = Some(http_collector);
        }

        metrics_bus
            .msg_register(METRICS_CHANNEL, self.server.clone())
            .map_err(|error| RuntimeError::BusUnavailable {
                feature: self.name.clone(),
                bus: format!("metrics_bus ({error})"),
            })?;
        info!(node = ctx.node_name(), "metrics feature loaded");
        Ok(())
    }

    async fn start(&self, ctx: &NodeContext) -> Result<(), RuntimeError> {
        let mut timers = self.timers.lock().unwrap_or_else(|p| p.into_inner());
        if !timers.is_empty() {
            return Ok(());
        }
        let period = ctx.config().collect_period;
        let collectors = self.collectors.lock().unwrap_or_else(|p| p.into_inner());
        for collector in collectors.iter() {
            timers.push(CollectorTimer::spawn(Arc::clone(collector), period));
        }
        info!(node = ctx.node_name(), count = timers.len(), "collector timers started");
        Ok(())
    }

    async fn stop(&self, _ctx: &NodeContext) -> Result<(), RuntimeError> {
        let mut timers = self.timers.lock().unwrap_or_else(|p| p.into_inner());
        timers.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EngineRegistry;
    use crate::config::Config;
    use crate::node::BusFeature;
    use serde_json::json;
    use std::time::Duration;

    async fn loaded_ctx() -> (NodeContext, MetricsFeature) {
        let mut config = Config::default();
        config.node_name = "node_a".into();
        config.collect_period = Duration::from_millis(30);
        let ctx = NodeContext::new(Arc::new(config), Arc::new(EngineRegistry::with_builtins()));
        BusFeature::new("msg_bus", vec!["msg".into()])
            .load(&ctx)
            .await
            .unwrap();
        BusFeature::new("metrics_bus", vec![METRICS_CHANNEL.into()])
            .load(&ctx)
            .await
            .unwrap();
        let feature = MetricsFeature::new("node_a");
        feature.load(&ctx).await.unwrap();
        (ctx, feature)
    }

    #[tokio::test]
    async fn test_load_without_metrics_bus_fails() {
        let ctx = NodeContext::new(
            Arc::new(Config::default()),
            Arc::new(EngineRegistry::with_builtins()),
        );
        let feature = MetricsFeature::new("node_a");
        let err = feature.load(&ctx).await.unwrap_err();
        assert!(matches!(err, RuntimeError::BusUnavailable { .. }));
        // A failed load can be retried after the bus appears.
        BusFeature::new("metrics_bus", vec![METRICS_CHANNEL.into()])
            .load(&ctx)
            .await
            .unwrap();
        feature.load(&ctx).await.unwrap();
    }

    #[tokio::test]
    async fn test_registers_all_four_kinds() {
        let (_ctx, feature) = loaded_ctx().await;
        let mut kinds = feature.server().kinds();
        kinds.sort();
        assert_eq!(kinds, ["bus", "host", "http", "process"]);
    }

    #[tokio::test]
    async fn test_sampling_feeds_the_server_state() {
        let (ctx, feature) = loaded_ctx().await;
        // Traffic on the msg bus to give the bus collector something.
        let msg_bus = ctx.bus("msg_bus").unwrap();
        msg_bus.publish("msg", "x", json!(1)).unwrap();

        feature.start(&ctx).await.unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;
        feature.stop(&ctx).await.unwrap();

        let server = feature.server();
        let items = server.state_items("bus");
        assert!(
            items.contains(&"node_a_msg_bus".to_string()),
            "bus subjects: {items:?}"
        );
        assert!(!server.state_items("host").is_empty());
        assert!(!server.state_items("process").is_empty());
    }
}
