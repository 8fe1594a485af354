//! # HTTP service metrics.
//!
//! Services expose an [`HttpCounters`] handle and bump it per request; the
//! collector drains one [`HttpMetricsRecord`] per service on every sample.
//! Subjects are service names.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::bus::MessageBus;
use crate::metrics::{epoch_ms, Collector, MetricsRecord, MetricsState};

/// Live per-service request counters, drained once per sample.
#[derive(Debug)]
pub struct HttpCounters {
    requests_count: AtomicU64,
    errors_count: AtomicU64,
    latency_ms: AtomicU64,
    latency_ms_min: AtomicU64,
    latency_ms_max: AtomicU64,
}

/// One drained period of [`HttpCounters`].
#[derive(Clone, Copy, Debug, Default)]
struct HttpSnapshot {
    requests: u64,
    errors: u64,
    latency: u64,
    latency_min: u64,
    latency_max: u64,
}

impl HttpCounters {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self {
            requests_count: AtomicU64::new(0),
            errors_count: AtomicU64::new(0),
            latency_ms: AtomicU64::new(0),
            latency_ms_min: AtomicU64::new(u64::MAX),
            latency_ms_max: AtomicU64::new(0),
        }
    }

    /// Records one served request with its latency; `ok == false` also
    /// counts an error.
    pub fn record_request(&self, latency_ms: u64, ok: bool) {
        self.requests_count.fetch_add(1, Ordering::Relaxed);
        self.latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
        self.latency_ms_min.fetch_min(latency_ms, Ordering::Relaxed);
        self.latency_ms_max.fetch_max(latency_ms, Ordering::Relaxed);
        if !ok {
            self.errors_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn drain(&self) -> HttpSnapshot {
        let min = self.latency_ms_min.swap(u64::MAX, Ordering::Relaxed);
        HttpSnapshot {
            requests: self.requests_count.swap(0, Ordering::Relaxed),
            errors: self.errors_count.swap(0, Ordering::Relaxed),
            latency: self.latency_ms.swap(0, Ordering::Relaxed),
            latency_min: if min == u64::MAX { 0 } else { min },
            latency_max: self.latency_ms_max.swap(0, Ordering::Relaxed),
        }
    }
}

impl Default for HttpCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Wire record of one HTTP service.
///
/// Shape: `{metric:"http", service, ts, requests_count, errors_count,
/// latency_ms, latency_ms_min, latency_ms_max, requests_count_sum,
/// errors_count_sum, latency_ms_sum}`.
#[derive(Debug)]
pub struct HttpMetricsRecord {
    service: String,
    counters: Arc<HttpCounters>,
    ts: u64,
    period: HttpSnapshot,
    requests_sum: u64,
    errors_sum: u64,
    latency_sum: u64,
}

impl HttpMetricsRecord {
    /// Attaches a record to a service's live counters.
    #[must_use]
    pub fn new(service: impl Into<String>, counters: Arc<HttpCounters>) -> Self {
        Self {
            service: service.into(),
            counters,
            ts: 0,
            period: HttpSnapshot::default(),
            requests_sum: 0,
            errors_sum: 0,
            latency_sum: 0,
        }
    }
}

impl MetricsRecord for HttpMetricsRecord {
    fn name(&self) -> &str {
        "http"
    }

    fn before(&mut self) {
        self.ts = 0;
        self.period = HttpSnapshot::default();
        self.requests_sum = 0;
        self.errors_sum = 0;
        self.latency_sum = 0;
    }

    fn iteration(&mut self) {
        let drained = self.counters.drain();
        self.ts = epoch_ms();
        self.period = drained;
        self.requests_sum += drained.requests;
        self.errors_sum += drained.errors;
        self.latency_sum += drained.latency;
    }

    fn after(&mut self) {
        self.ts = epoch_ms();
    }

    fn values(&self) -> Value {
        json!({
            "metric": "http",
            "service": self.service,
            "ts": self.ts,
            "requests_count": self.period.requests,
            "errors_count": self.period.errors,
            "latency_ms": self.period.latency,
            "latency_ms_min": self.period.latency_min,
            "latency_ms_max": self.period.latency_max,
            "requests_count_sum": self.requests_sum,
            "errors_count_sum": self.errors_sum,
            "latency_ms_sum": self.latency_sum,
        })
    }
}

/// Collector of `"http"` records across the node's services.
pub struct HttpCollector {
    sender: String,
    metrics_bus: MessageBus,
    channel: String,
    records: Mutex<Vec<HttpMetricsRecord>>,
    state: Mutex<MetricsState>,
}

impl HttpCollector {
    /// Creates a collector with no monitored services yet.
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
            records: Mutex::new(Vec::new()),
            state: Mutex::new(MetricsState::new("http", "service")),
        }
    }

    /// Registers a service and returns the counters handle it must bump.
    pub fn monitor(&self, service: impl Into<String>) -> Arc<HttpCounters> {
        let counters = Arc::new(HttpCounters::new());
        let mut records = self.records.lock().unwrap_or_else(|p| p.into_inner());
        records.push(HttpMetricsRecord::new(service, Arc::clone(&counters)));
        counters
    }
}

#[async_trait]
impl Collector for HttpCollector {
    fn kind(&self) -> &str {
        "http"
    }

    fn subject_key(&self) -> &str {
        "service"
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
        if values.is_empty() {
            return;
        }
        let payload = json!({ "metric": "http", "values": values });
        if let Err(error) = self.metrics_bus.publish(&self.channel, &self.sender, payload) {
            debug!(%error, "http metrics publish failed");
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
    use crate::bus::StreamBusEngine;

    fn bus(name: &str) -> MessageBus {
        MessageBus::new(name, Arc::new(StreamBusEngine::new(name, 16)))
    }

    #[tokio::test]
    async fn test_counters_drain_into_period_and_sums() {
        let metrics_bus = bus("m");
        metrics_bus.channel_add("metrics");
        let collector = HttpCollector::new("m", metrics_bus, "metrics");
        let counters = collector.monitor("rest_api");

        counters.record_request(12, true);
        counters.record_request(30, false);
        collector.sample().await;

        let values = {
            let records = collector.records.lock().unwrap();
            records[0].values()
        };
        assert_eq!(values["requests_count"], 2);
        assert_eq!(values["errors_count"], 1);
        assert_eq!(values["latency_ms"], 42);
        assert_eq!(values["latency_ms_min"], 12);
        assert_eq!(values["latency_ms_max"], 30);

        collector.sample().await;
        let values = {
            let records = collector.records.lock().unwrap();
            records[0].values()
        };
        assert_eq!(values["requests_count"], 0);
        assert_eq!(values["requests_count_sum"], 2);
    }

    #[tokio::test]
    async fn test_sample_without_services_publishes_nothing() {
        let metrics_bus = bus("m");
        metrics_bus.channel_add("metrics");
        let collector = HttpCollector::new("m", metrics_bus.clone(), "metrics");
        collector.sample().await;
        assert_eq!(metrics_bus.drain_counters().msg_count, 0);
    }
}
