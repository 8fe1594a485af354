//! # Metrics server.
//!
//! Terminal consumer of the metrics channel. Incoming payloads have the
//! shape `{metric: <kind>, values: <record | [records]>}`; the server
//! validates that shape at the boundary and hands `values` to the collector
//! registered for `kind`. State queries delegate to the collectors.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::bus::{BusMessage, Receive};
use crate::error::RuntimeError;
use crate::metrics::Collector;

/// Validating dispatcher between the metrics channel and the collectors.
pub struct MetricsServer {
    name: String,
    collectors: RwLock<HashMap<String, Arc<dyn Collector>>>,
}

impl MetricsServer {
    /// Creates a server with no collectors registered.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collectors: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a collector under its kind, replacing any previous one.
    pub fn register_collector(&self, collector: Arc<dyn Collector>) {
        let mut collectors = self.collectors.write().unwrap_or_else(|p| p.into_inner());
        collectors.insert(collector.kind().to_string(), collector);
    }

    fn collector(&self, kind: &str) -> Option<Arc<dyn Collector>> {
        let collectors = self.collectors.read().unwrap_or_else(|p| p.into_inner());
        collectors.get(kind).cloned()
    }

    /// Registered kinds, unordered.
    #[must_use]
    pub fn kinds(&self) -> Vec<String> {
        let collectors = self.collectors.read().unwrap_or_else(|p| p.into_inner());
        collectors.keys().cloned().collect()
    }

    /// Validates one metrics payload and dispatches it to its collector.
    ///
    /// ## Rules
    /// - `payload` must be an object with a string `metric` and a `values`
    ///   field.
    /// - `metric` must name a registered collector.
    /// - A `metric` field carried inside the records must agree with the
    ///   envelope's kind.
    pub fn process_metric(&self, payload: &Value) -> Result<(), RuntimeError> {
        let Some(fields) = payload.as_object() else {
            return Err(RuntimeError::MalformedMetricsRecord {
                reason: "payload is not an object".into(),
            });
        };
        let Some(kind) = fields.get("metric").and_then(Value::as_str) else {
            return Err(RuntimeError::MalformedMetricsRecord {
                reason: "missing string field [metric]".into(),
            });
        };
        let Some(values) = fields.get("values") else {
            return Err(RuntimeError::MalformedMetricsRecord {
                reason: format!("missing field [values] for kind [{kind}]"),
            });
        };
        let first = match values {
            Value::Array(items) => items.first(),
            other => Some(other),
        };
        if let Some(inner) = first.and_then(|v| v.get("metric")).and_then(Value::as_str) {
            if inner != kind {
                return Err(RuntimeError::MalformedMetricsRecord {
                    reason: format!("record kind [{inner}] does not match envelope [{kind}]"),
                });
            }
        }
        let Some(collector) = self.collector(kind) else {
            return Err(RuntimeError::MalformedMetricsRecord {
                reason: format!("no collector for kind [{kind}]"),
            });
        };
        collector.reduce(values);
        Ok(())
    }

    /// Known subjects of a kind; empty when the kind is unregistered.
    #[must_use]
    pub fn state_items(&self, kind: &str) -> Vec<String> {
        self.collector(kind)
            .map(|c| c.subjects())
            .unwrap_or_default()
    }

    /// Aggregated state of a kind across all its subjects.
    #[must_use]
    pub fn state_values(&self, kind: &str) -> Value {
        self.collector(kind)
            .map(|c| c.state_values())
            .unwrap_or_else(|| json!({}))
    }

    /// Aggregated state of one subject; a stub when the subject (or even
    /// the kind) is unknown, so callers always get a renderable shape.
    #[must_use]
    pub fn state_values_for(&self, kind: &str, subject: &str) -> Value {
        match self.collector(kind) {
            Some(collector) => collector.state_values_for(subject),
            None => json!({ "metric": kind, "subject": subject }),
        }
    }
}

#[async_trait]
impl Receive for MetricsServer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn on_message(&self, msg: &BusMessage) {
        if msg.sender == self.name {
            debug!(server = %self.name, "own message suppressed");
            return;
        }
        if let Err(error) = self.process_metric(&msg.payload) {
            warn!(server = %self.name, sender = %msg.sender, %error, "metrics record dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{MessageBus, StreamBusEngine};
    use crate::metrics::BusCollector;
    use std::time::Duration;

    fn bus(name: &str) -> MessageBus {
        MessageBus::new(name, Arc::new(StreamBusEngine::new(name, 16)))
    }

    fn server_with_bus_collector() -> MetricsServer {
        let server = MetricsServer::new("metrics_server");
        let collector = BusCollector::new("m", bus("m"), "metrics", Vec::new());
        server.register_collector(Arc::new(collector));
        server
    }

    #[test]
    fn test_process_metric_dispatches_to_collector() {
        let server = server_with_bus_collector();
        server
            .process_metric(&json!({
                "metric": "bus",
                "values": [{"metric": "bus", "bus_name": "node_a_msg_bus", "msg_count": 3}],
            }))
            .unwrap();
        assert_eq!(server.state_items("bus"), vec!["node_a_msg_bus"]);
        let v = server.state_values_for("bus", "node_a_msg_bus");
        assert_eq!(v["msg_count_sum"], 3.0);
    }

    #[test]
    fn test_malformed_payloads_are_rejected() {
        let server = server_with_bus_collector();
        assert!(server.process_metric(&json!("nope")).is_err());
        assert!(server.process_metric(&json!({"values": []})).is_err());
        assert!(server.process_metric(&json!({"metric": "bus"})).is_err());
        assert!(server
            .process_metric(&json!({"metric": "ghost", "values": []}))
            .is_err());
        assert!(server
            .process_metric(&json!({
                "metric": "bus",
                "values": [{"metric": "host", "hostname": "a"}],
            }))
            .is_err());
    }

    #[test]
    fn test_unknown_subject_query_yields_stub() {
        let server = server_with_bus_collector();
        let v = server.state_values_for("bus", "never_seen");
        assert_eq!(v, json!({"bus_name": "never_seen"}));
    }

    #[tokio::test]
    async fn test_own_messages_are_suppressed() {
        let server = Arc::new(server_with_bus_collector());
        let bus = bus("node_a_metrics_bus");
        bus.channel_add("metrics");
        bus.msg_register("metrics", server.clone()).unwrap();

        // Sent under the server's own name: must not reach the reducer.
        bus.publish(
            "metrics",
            "metrics_server",
            json!({"metric": "bus", "values": [{"metric": "bus", "bus_name": "self_bus"}]}),
        )
        .unwrap();
        // Sent by a peer: must land.
        bus.publish(
            "metrics",
            "node_b_metrics_bus",
            json!({"metric": "bus", "values": [{"metric": "bus", "bus_name": "peer_bus"}]}),
        )
        .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(server.state_items("bus"), vec!["peer_bus"]);
    }
}
