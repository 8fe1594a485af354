//! # Host metrics.
//!
//! Samples machine-level facts: hostname, cpu count, load averages, memory,
//! uptime. Sources are `$HOSTNAME` / `/etc/hostname` and the `/proc` files;
//! on platforms without them the affected fields read zero, the record shape
//! stays stable.

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::bus::MessageBus;
use crate::metrics::{epoch_ms, Collector, MetricsRecord, MetricsState};

/// Machine hostname: `$HOSTNAME`, then `/etc/hostname`, then `"unknown"`.
#[must_use]
pub fn hostname() -> String {
    if let Ok(name) = std::env::var("HOSTNAME") {
        if !name.is_empty() {
            return name;
        }
    }
    std::fs::read_to_string("/etc/hostname")
        .map(|s| s.trim().to_string())
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

fn load_averages() -> (f64, f64, f64) {
    let Ok(raw) = std::fs::read_to_string("/proc/loadavg") else {
        return (0.0, 0.0, 0.0);
    };
    let mut parts = raw.split_whitespace();
    let mut next = || {
        parts
            .next()
            .and_then(|p| p.parse::<f64>().ok())
            .unwrap_or(0.0)
    };
    (next(), next(), next())
}

fn meminfo_kb(field: &str) -> u64 {
    let Ok(raw) = std::fs::read_to_string("/proc/meminfo") else {
        return 0;
    };
    raw.lines()
        .find(|line| line.starts_with(field))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|kb| kb.parse().ok())
        .unwrap_or(0)
}

fn uptime_s() -> u64 {
    std::fs::read_to_string("/proc/uptime")
        .ok()
        .and_then(|raw| {
            raw.split_whitespace()
                .next()
                .and_then(|s| s.parse::<f64>().ok())
        })
        .unwrap_or(0.0) as u64
}

/// Wire record of the local machine.
///
/// Shape: `{metric:"host", hostname, ts, cpus_count, load_1m, load_5m,
/// load_15m, mem_total_kb, mem_available_kb, uptime_s}`.
#[derive(Debug)]
pub struct HostMetricsRecord {
    hostname: String,
    ts: u64,
    cpus_count: u64,
    load: (f64, f64, f64),
    mem_total_kb: u64,
    mem_available_kb: u64,
    uptime_s: u64,
}

impl HostMetricsRecord {
    /// Creates an unsampled record for this machine.
    #[must_use]
    pub fn new() -> Self {
        Self {
            hostname: hostname(),
            ts: 0,
            cpus_count: 0,
            load: (0.0, 0.0, 0.0),
            mem_total_kb: 0,
            mem_available_kb: 0,
            uptime_s: 0,
        }
    }
}

impl Default for HostMetricsRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRecord for HostMetricsRecord {
    fn name(&self) -> &str {
        "host"
    }

    fn before(&mut self) {
        self.ts = 0;
    }

    fn iteration(&mut self) {
        self.ts = epoch_ms();
        self.cpus_count = std::thread::available_parallelism()
            .map(|n| n.get() as u64)
            .unwrap_or(1);
        self.load = load_averages();
        self.mem_total_kb = meminfo_kb("MemTotal");
        self.mem_available_kb = meminfo_kb("MemAvailable");
        self.uptime_s = uptime_s();
    }

    fn after(&mut self) {
        self.ts = epoch_ms();
    }

    fn values(&self) -> Value {
        json!({
            "metric": "host",
            "hostname": self.hostname,
            "ts": self.ts,
            "cpus_count": self.cpus_count,
            "load_1m": self.load.0,
            "load_5m": self.load.1,
            "load_15m": self.load.2,
            "mem_total_kb": self.mem_total_kb,
            "mem_available_kb": self.mem_available_kb,
            "uptime_s": self.uptime_s,
        })
    }
}

/// Collector of `"host"` records, keyed by hostname.
pub struct HostCollector {
    sender: String,
    metrics_bus: MessageBus,
    channel: String,
    record: Mutex<HostMetricsRecord>,
    state: Mutex<MetricsState>,
}

impl HostCollector {
    /// Creates a collector publishing on `metrics_bus` under `sender`.
    #[must_use]
    pub fn new(
        sender: impl Into<String>,
        metrics_bus: MessageBus,
        channel: impl Into<String>,
    ) -> Self {
        Self {
            sender: sender.into(),
            metrics_bus,
            channel: channel.into(),
            record: Mutex::new(HostMetricsRecord::new()),
            state: Mutex::new(MetricsState::new("host", "hostname")),
        }
    }
}

#[async_trait]
impl Collector for HostCollector {
    fn kind(&self) -> &str {
        "host"
    }

    fn subject_key(&self) -> &str {
        "hostname"
    }

    async fn sample(&self) {
        let values = {
            let mut record = self.record.lock().unwrap_or_else(|p| p.into_inner());
            record.iteration();
            record.values()
        };
        let payload = json!({ "metric": "host", "values": [values] });
        if let Err(error) = self.metrics_bus.publish(&self.channel, &self.sender, payload) {
            debug!(%error, "host metrics publish failed");
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
