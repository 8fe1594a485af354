//! # Bus traffic metrics.
//!
//! One [`BusMetricsRecord`] per monitored bus drains that bus's counters on
//! every sample, so each published record carries the deltas of one period
//! plus running totals. The [`BusCollector`] publishes the records on the
//! metrics bus and reduces incoming `"bus"` records from other nodes.

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::bus::{CountersSnapshot, MessageBus};
use crate::metrics::{epoch_ms, Collector, MetricsRecord, MetricsState};

/// Wire record of one monitored bus.
///
/// Shape: `{metric:"bus", bus_name, ts, msg_count, msg_size, errors_count,
/// subscribers_count, msg_count_sum, msg_size_sum, errors_count_sum,
/// subscribers_count_sum}` where plain fields are period deltas and `_sum`
/// fields are totals since the record was created.
#[derive(Debug)]
pub struct BusMetricsRecord {
    bus: MessageBus,
    ts: u64,
    period: CountersSnapshot,
    sums: CountersSnapshot,
}

impl BusMetricsRecord {
    /// Attaches a record to the bus it monitors.
    #[must_use]
    pub fn new(bus: MessageBus) -> Self {
        Self {
            bus,
            ts: 0,
            period: CountersSnapshot::default(),
            sums: CountersSnapshot::default(),
        }
    }
}

impl MetricsRecord for BusMetricsRecord {
    fn name(&self) -> &str {
        "bus"
    }

    fn before(&mut self) {
        self.ts = 0;
        self.period = CountersSnapshot::default();
        self.sums = CountersSnapshot::default();
    }

    fn iteration(&mut self) {
        let snap = self.bus.drain_counters();
        self.ts = epoch_ms();
        self.period = snap;
        self.sums.msg_count += snap.msg_count;
        self.sums.msg_size += snap.msg_size;
        self.sums.errors_count += snap.errors_count;
        self.sums.subscribers_count += snap.subscribers_count;
    }

    fn after(&mut self) {
        self.ts = epoch_ms();
    }

    fn values(&self) -> Value {
        json!({
            "metric": "bus",
            "bus_name": self.bus.name(),
            "ts": self.ts,
            "msg_count": self.period.msg_count,
            "msg_size": self.period.msg_size,
            "errors_count": self.period.errors_count,
            "subscribers_count": self.period.subscribers_count,
            "msg_count_sum": self.sums.msg_count,
            "msg_size_sum": self.sums.msg_size,
            "errors_count_sum": self.sums.errors_count,
            "subscribers_count_sum": self.sums.subscribers_count,
        })
    }
}

/// Collector of `"bus"` records across every bus of the local node.
pub struct BusCollector {
    sender: String,
    metrics_bus: MessageBus,
    channel: String,
    records: Mutex<Vec<BusMetricsRecord>>,
    state: Mutex<MetricsState>,
}

impl BusCollector {
    /// ### Parameters
    /// - `sender`: name stamped on published messages (the node's metrics
    ///   bus unique name).
    /// - `metrics_bus`: the bus samples are published on.
    /// - `channel`: the metrics channel name.
    /// - `monitored`: every bus whose traffic this collector samples.
    #[must_use]
    pub fn new(
        sender: impl Into<String>,
        metrics_bus: MessageBus,
        channel: impl Into<String>,
        monitored: Vec<MessageBus>,
    ) -> Self {
        let records = monitored.into_iter().map(BusMetricsRecord::new).collect();
        Self {
            sender: sender.into(),
            metrics_bus,
            channel: channel.into(),
            records: Mutex::new(records),
            state: Mutex::new(MetricsState::new("bus", "bus_name")),
        }
    }
}

#[async_trait]
impl Collector for BusCollector {
    fn kind(&self) -> &str {
        "bus"
    }

    fn subject_key(&self) -> &str {
        "bus_name"
    }

    async fn sample(&self) {
        let values: Vec<Value> = {
            let mut records = self.records.lock().unwrap_or_else(|p| p.into_inner());
            records
                .iter_mut()
                .map(|r| {
                    r.iteration();
                    r.values()
                })
                .collect()
        };
        let payload = json!({ "metric": "bus", "values": values });
        if let Err(error) = self.metrics_bus.publish(&self.channel, &self.sender, payload) {
            debug!(%error, "bus metrics publish failed");
        }
    }

    fn reduce(&self, values: &Value) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        match values {
            Value::Array(items) => {
                for item in items {
                    state.reduce(item);
                }
            }
            other => state.reduce(other),
        }
    }

    fn subjects(&self) -> Vec<String> {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.subjects()
    }

    fn state_values(&self) -> Value {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.values()
    }

    fn state_values_for(&self, subject: &str) -> Value {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.values_for(subject).unwrap_or_else(|| self.stub_for(subject))
    }
}
