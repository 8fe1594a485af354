//! # Aggregated metrics state.
//!
//! One [`MetricsState`] exists per metrics kind. It folds wire values into
//! per-subject slots keyed by the kind's subject field (`bus_name`,
//! `hostname`, `runtime_uid`, `service`): the latest raw record is kept as
//! `last_metric`, every numeric field is summed into `<field>_sum`, and a
//! `count` tracks how many records were folded.

use std::collections::HashMap;

use serde_json::{json, Map, Value};

#[derive(Debug, Default)]
struct SubjectState {
    last_metric: Value,
    count: u64,
    sums: Map<String, Value>,
}

/// Per-subject reduction of one metrics kind.
#[derive(Debug)]
pub struct MetricsState {
    kind: String,
    subject_key: String,
    subjects: HashMap<String, SubjectState>,
}

impl MetricsState {
    /// Creates an empty state for a kind with its subject field name.
    #[must_use]
    pub fn new(kind: impl Into<String>, subject_key: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            subject_key: subject_key.into(),
            subjects: HashMap::new(),
        }
    }

    /// Metrics kind this state aggregates.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Subject field name records are keyed by.
    #[must_use]
    pub fn subject_key(&self) -> &str {
        &self.subject_key
    }

    /// Registers a subject ahead of its first record. Idempotent: an
    /// existing subject keeps its accumulated state.
    pub fn add_subject(&mut self, subject: &str) {
        self.subjects.entry(subject.to_string()).or_default();
    }

    /// Folds one wire record into its subject slot, creating it if needed.
    ///
    /// Records without the subject field are dropped silently; the caller
    /// validates shape at the receiver boundary.
    pub fn reduce(&mut self, values: &Value) {
        let Some(subject) = values.get(&self.subject_key).and_then(Value::as_str) else {
            return;
        };
        let slot = self.subjects.entry(subject.to_string()).or_default();
        slot.count += 1;

        if let Some(fields) = values.as_object() {
            for (key, value) in fields {
                if key == "metric" || key == "ts" || key == &self.subject_key {
                    continue;
                }
                let Some(incoming) = value.as_f64() else {
                    continue;
                };
                let sum_key = format!("{key}_sum");
                let prior = slot
                    .sums
                    .get(&sum_key)
                    .and_then(Value::as_f64)
                    .unwrap_or(0.0);
                slot.sums.insert(sum_key, json!(prior + incoming));
            }
        }
        slot.last_metric = values.clone();
    }

    /// Known subject names, unordered.
    #[must_use]
    pub fn subjects(&self) -> Vec<String> {
        self.subjects.keys().cloned().collect()
    }

    /// Aggregated values for one subject, or `None` when unknown.
    #[must_use]
    pub fn values_for(&self, subject: &str) -> Option<Value> {
        self.subjects.get(subject).map(|slot| {
            let mut out = Map::new();
            out.insert("metric".into(), json!(self.kind));
            out.insert(self.subject_key.clone(), json!(subject));
            out.insert("count".into(), json!(slot.count));
            out.insert("last_metric".into(), slot.last_metric.clone());
            for (key, value) in &slot.sums {
                out.insert(key.clone(), value.clone());
            }
            Value::Object(out)
        })
    }

    /// Aggregated values for every subject, keyed by subject name.
    #[must_use]
    pub fn values(&self) -> Value {
        let mut out = Map::new();
        for subject in self.subjects.keys() {
            if let Some(values) = self.values_for(subject) {
                out.insert(subject.clone(), values);
            }
        }
        Value::Object(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reduce_sums_numeric_fields_and_counts() {
        let mut state = MetricsState::new("bus", "bus_name");
        state.reduce(&json!({
            "metric": "bus", "bus_name": "node_a_msg_bus", "ts": 1,
            "msg_count": 3, "msg_size": 120,
        }));
        state.reduce(&json!({
            "metric": "bus", "bus_name": "node_a_msg_bus", "ts": 2,
            "msg_count": 2, "msg_size": 30,
        }));

        let v = state.values_for("node_a_msg_bus").unwrap();
        assert_eq!(v["count"], 2);
        assert_eq!(v["msg_count_sum"], 5.0);
        assert_eq!(v["msg_size_sum"], 150.0);
        assert_eq!(v["last_metric"]["ts"], 2);
    }

    #[test]
    fn test_add_subject_is_idempotent() {
        let mut state = MetricsState::new("host", "hostname");
        state.add_subject("alpha");
        state.reduce(&json!({"metric": "host", "hostname": "alpha", "cpus_count": 4}));
        state.add_subject("alpha");

        let v = state.values_for("alpha").unwrap();
        assert_eq!(v["count"], 1);
    }

    #[test]
    fn test_record_without_subject_is_dropped() {
        let mut state = MetricsState::new("http", "service");
        state.reduce(&json!({"metric": "http", "requests_count": 9}));
        assert!(state.subjects().is_empty());
    }

    #[test]
    fn test_unknown_subject_has_no_values() {
        let state = MetricsState::new("bus", "bus_name");
        assert!(state.values_for("ghost").is_none());
    }
}
