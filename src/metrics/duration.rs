//! # Duration metric.
//!
//! Captures a start timestamp, per-iteration timestamps, and an end
//! timestamp for any timed operation. Transactions attach one of these and
//! tick `iteration()` once per settled executable.

use serde_json::{json, Value};

use super::{epoch_ms, MetricsRecord};

/// Wall-clock duration metric with optional per-iteration ticks.
///
/// Wire shape: `{metric:"duration", start, duration[, iterations: [ms]]}`
/// where `iterations` holds the deltas between consecutive ticks.
#[derive(Debug, Default)]
pub struct DurationMetric {
    ts_before: u64,
    ts_at: Vec<u64>,
    ts_after: u64,
}

impl DurationMetric {
    /// Creates an idle duration metric.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetricsRecord for DurationMetric {
    fn name(&self) -> &str {
        "duration"
    }

    fn before(&mut self) {
        self.ts_before = epoch_ms();
        self.ts_at.clear();
        self.ts_after = 0;
    }

    fn iteration(&mut self) {
        self.ts_at.push(epoch_ms());
    }

    fn after(&mut self) {
        self.ts_after = epoch_ms();
    }

    fn values(&self) -> Value {
        let duration = self.ts_after.saturating_sub(self.ts_before);
        if self.ts_at.is_empty() {
            return json!({
                "metric": "duration",
                "start": self.ts_before,
                "duration": duration,
            });
        }

        let mut iterations = Vec::with_capacity(self.ts_at.len());
        let mut prev = self.ts_before;
        for ts in &self.ts_at {
            iterations.push(ts.saturating_sub(prev));
            prev = *ts;
        }

        json!({
            "metric": "duration",
            "start": self.ts_before,
            "duration": duration,
            "iterations": iterations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_without_iterations_has_no_iterations_field() {
        let mut m = DurationMetric::new();
        m.before();
        m.after();
        let v = m.values();
        assert_eq!(v["metric"], "duration");
        assert!(v.get("iterations").is_none());
    }

    #[test]
    fn test_iterations_are_deltas_between_ticks() {
        let mut m = DurationMetric::new();
        m.before();
        m.iteration();
        m.iteration();
        m.iteration();
        m.after();
        let v = m.values();
        let iters = v["iterations"].as_array().expect("iterations array");
        assert_eq!(iters.len(), 3);
        // Deltas are non-negative and the total never exceeds the span.
        let total: u64 = iters.iter().map(|d| d.as_u64().unwrap_or(0)).sum();
        assert!(total <= v["duration"].as_u64().unwrap_or(0) + 1);
    }

    #[test]
    fn test_before_rearms_a_finished_metric() {
        let mut m = DurationMetric::new();
        m.before();
        m.iteration();
        m.after();
        m.before();
        let v = m.values();
        assert!(v.get("iterations").is_none());
    }
}
