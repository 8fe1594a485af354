//! # Logs server.
//!
//! Terminal consumer of the logs channel. Wire records have the shape
//! `{ts, level, source, logs: [lines]}`; every field is required and `logs`
//! must be a non-empty array. Valid records are re-emitted through the
//! local logger at their carried level, so remote node logs interleave with
//! local ones.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, error, info, trace, warn};

use crate::bus::{BusMessage, Receive};
use crate::error::RuntimeError;

/// Validating re-emitter of remote log records.
pub struct LogsServer {
    name: String,
    accepted: AtomicU64,
    rejected: AtomicU64,
}

impl LogsServer {
    /// Creates a logs server with the given receiver name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            accepted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// Records accepted since startup.
    #[must_use]
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    /// Records rejected since startup.
    #[must_use]
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Validates one log record and re-emits its lines.
    pub fn process_log(&self, payload: &Value) -> Result<(), RuntimeError> {
        let Some(fields) = payload.as_object() else {
            return Err(RuntimeError::MalformedLogRecord {
                reason: "payload is not an object".into(),
            });
        };
        let ts_ok = match fields.get("ts") {
            Some(Value::Number(n)) => n.as_u64().is_some(),
            Some(Value::String(s)) => !s.is_empty(),
            _ => false,
        };
        if !ts_ok {
            return Err(RuntimeError::MalformedLogRecord {
                reason: "missing field [ts]".into(),
            });
        }
        let level = match fields.get("level").and_then(Value::as_str) {
            Some(level) if !level.is_empty() => level,
            _ => {
                return Err(RuntimeError::MalformedLogRecord {
                    reason: "missing string field [level]".into(),
                })
            }
        };
        let source = match fields.get("source").and_then(Value::as_str) {
            Some(source) if !source.is_empty() => source,
            _ => {
                return Err(RuntimeError::MalformedLogRecord {
                    reason: "missing string field [source]".into(),
                })
            }
        };
        let lines = match fields.get("logs").and_then(Value::as_array) {
            Some(lines) if !lines.is_empty() => lines,
            _ => {
                return Err(RuntimeError::MalformedLogRecord {
                    reason: "missing non-empty array field [logs]".into(),
                })
            }
        };

        for line in lines {
            let text = match line {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            emit(level, source, &text);
        }
        Ok(())
    }
}

/// Re-emits one remote line at its carried level; unknown levels map to
/// `info`.
fn emit(level: &str, source: &str, text: &str) {
    match level {
        "trace" => trace!(remote = source, "{text}"),
        "debug" => debug!(remote = source, "{text}"),
        "warn" => warn!(remote = source, "{text}"),
        "error" => error!(remote = source, "{text}"),
        _ => info!(remote = source, "{text}"),
    }
}

#[async_trait]
impl Receive for LogsServer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn on_message(&self, msg: &BusMessage) {
        if msg.sender == self.name {
            debug!(server = %self.name, "own message suppressed");
            return;
        }
        match self.process_log(&msg.payload) {
            Ok(()) => {
                self.accepted.fetch_add(1, Ordering::Relaxed);
            }
            Err(error) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                warn!(server = %self.name, sender = %msg.sender, %error, "log record dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_record() -> Value {
        json!({
            "ts": 1700000000000u64,
            "level": "info",
            "source": "node_b",
            "logs": ["worker started", "listening on 5000"],
        })
    }

    #[test]
    fn test_valid_record_is_accepted() {
        let server = LogsServer::new("logs_server");
        server.process_log(&valid_record()).unwrap();
    }

    #[test]
    fn test_each_missing_field_is_rejected() {
        let server = LogsServer::new("logs_server");
        for field in ["ts", "level", "source", "logs"] {
            let mut record = valid_record();
            record.as_object_mut().unwrap().remove(field);
            let err = server.process_log(&record).unwrap_err();
            assert!(
                matches!(err, RuntimeError::MalformedLogRecord { .. }),
                "field [{field}]"
            );
        }
    }

    #[test]
    fn test_empty_logs_array_is_rejected() {
        let server = LogsServer::new("logs_server");
        let mut record = valid_record();
        record["logs"] = json!([]);
        assert!(server.process_log(&record).is_err());
    }

    #[tokio::test]
    async fn test_malformed_record_does_not_stop_the_server() {
        let server = LogsServer::new("logs_server");
        server
            .on_message(&BusMessage::new("logs", "node_b_logs_bus", json!("garbage")))
            .await;
        server
            .on_message(&BusMessage::new("logs", "node_b_logs_bus", valid_record()))
            .await;
        assert_eq!(server.rejected(), 1);
        assert_eq!(server.accepted(), 1);
    }

    #[tokio::test]
    async fn test_own_records_are_suppressed() {
        let server = LogsServer::new("logs_server");
        server
            .on_message(&BusMessage::new("logs", "logs_server", valid_record()))
            .await;
        assert_eq!(server.accepted(), 0);
        assert_eq!(server.rejected(), 0);
    }
}
