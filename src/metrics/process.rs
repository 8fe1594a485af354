//! # Process runtime metrics.
//!
//! Samples the current process: pid, uptime since the record was created,
//! virtual and resident memory from `/proc/self/statm`. Subjects are runtime
//! uids (`<hostname>_<pid>`) so a host running several nodes keeps them
//! apart.

use std::sync::Mutex;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::bus::MessageBus;
use crate::metrics::host::hostname;
use crate::metrics::{epoch_ms, Collector, MetricsRecord, MetricsState};

const PAGE_SIZE_KB: u64 = 4;

/// Runtime uid of the current process: `<hostname>_<pid>`.
#[must_use]
pub fn runtime_uid() -> String {
    format!("{}_{}", hostname(), std::process::id())
}

fn statm_kb() -> (u64, u64) {
    let Ok(raw) = std::fs::read_to_string("/proc/self/statm") else {
        return (0, 0);
    };
    let mut parts = raw.split_whitespace();
    let mut next = || {
        parts
            .next()
            .and_then(|p| p.parse::<u64>().ok())
            .unwrap_or(0)
    };
    let vsize_pages = next();
    let rss_pages = next();
    (vsize_pages * PAGE_SIZE_KB, rss_pages * PAGE_SIZE_KB)
}

/// Wire record of the current process.
///
/// Shape: `{metric:"process", runtime_uid, ts, pid, uptime_s, mem_vsize_kb,
/// mem_rss_kb}`.
#[derive(Debug)]
pub struct ProcessMetricsRecord {
    runtime_uid: String,
    started: Instant,
    ts: u64,
    pid: u32,
    uptime_s: u64,
    mem_vsize_kb: u64,
    mem_rss_kb: u64,
}

impl ProcessMetricsRecord {
    /// Creates an unsampled record for the current process.
    #[must_use]
    pub fn new() -> Self {
        Self {
            runtime_uid: runtime_uid(),
            started: Instant::now(),
            ts: 0,
            pid: std::process::id(),
            uptime_s: 0,
            mem_vsize_kb: 0,
            mem_rss_kb: 0,
        }
    }
}

impl Default for ProcessMetricsRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRecord for ProcessMetricsRecord {
    fn name(&self) -> &str {
        "process"
    }

    fn before(&mut self) {
        self.ts = 0;
    }

    fn iteration(&mut self) {
        self.ts = epoch_ms();
        self.uptime_s = self.started.elapsed().as_secs();
        let (vsize, rss) = statm_kb();
        self.mem_vsize_kb = vsize;
        self.mem_rss_kb = rss;
    }

    fn after(&mut self) {
        self.ts = epoch_ms();
    }

    fn values(&self) -> Value {
        json!({
            "metric": "process",
            "runtime_uid": self.runtime_uid,
            "ts": self.ts,
            "pid": self.pid,
            "uptime_s": self.uptime_s,
            "mem_vsize_kb": self.mem_vsize_kb,
            "mem_rss_kb": self.mem_rss_kb,
        })
    }
}

/// Collector of `"process"` records, keyed by runtime uid.
pub struct ProcessCollector {
    sender: String,
    metrics_bus: MessageBus,
    channel: String,
    record: Mutex<ProcessMetricsRecord>,
    state: Mutex<MetricsState>,
}

impl ProcessCollector {
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
            record: Mutex::new(ProcessMetricsRecord::new()),
            state: Mutex::new(MetricsState::new("process", "runtime_uid")),
        }
    }
}

#[async_trait]
impl Collector for ProcessCollector {
    fn kind(&self) -> &str {
        "process"
    }

    fn subject_key(&self) -> &str {
        "runtime_uid"
    }

    async fn sample(&self) {
        let values = {
            let mut record = self.record.lock().unwrap_or_else(|p| p.into_inner());
            record.iteration();
            record.values()
        };
        let payload = json!({ "metric": "process", "values": [values] });
        if let Err(error) = self.metrics_bus.publish(&self.channel, &self.sender, payload) {
            debug!(%error, "process metrics publish failed");
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_uid_ends_with_pid() {
        let uid = runtime_uid();
        assert!(uid.ends_with(&std::process::id().to_string()));
        assert!(uid.contains('_'));
    }

    #[test]
    fn test_record_carries_pid_and_uid() {
        let mut record = ProcessMetricsRecord::new();
        record.iteration();
        let v = record.values();
        assert_eq!(v["metric"], "process");
        assert_eq!(v["pid"].as_u64().unwrap(), u64::from(std::process::id()));
        assert_eq!(v["runtime_uid"], runtime_uid());
    }
}
