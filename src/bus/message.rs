//! # The bus wire message.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One message published on a bus channel.
///
/// The `sender` is the bus unique name of the publishing endpoint; receivers
/// compare it against their own name to suppress feedback loops.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BusMessage {
    /// Logical channel the message was published on.
    pub channel: String,
    /// Bus unique name of the publisher.
    pub sender: String,
    /// Opaque JSON payload.
    pub payload: Value,
}

impl BusMessage {
    /// Builds a message for the given channel/sender.
    #[must_use]
    pub fn new(channel: impl Into<String>, sender: impl Into<String>, payload: Value) -> Self {
        Self {
            channel: channel.into(),
            sender: sender.into(),
            payload,
        }
    }

    /// Approximate serialized size in bytes, used for `msg_size` accounting.
    #[must_use]
    pub fn size_hint(&self) -> u64 {
        let payload_len = match &self.payload {
            Value::Null => 4,
            Value::String(s) => s.len() + 2,
            other => other.to_string().len(),
        };
        (self.channel.len() + self.sender.len() + payload_len) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_roundtrips_through_json() {
        let msg = BusMessage::new("metrics", "node_a_metrics_bus", json!({"metric": "host"}));
        let line = serde_json::to_string(&msg).unwrap();
        let back: BusMessage = serde_json::from_str(&line).unwrap();
        assert_eq!(back.channel, "metrics");
        assert_eq!(back.sender, "node_a_metrics_bus");
        assert_eq!(back.payload["metric"], "host");
    }

    #[test]
    fn test_size_hint_grows_with_payload() {
        let small = BusMessage::new("c", "s", json!(null));
        let big = BusMessage::new("c", "s", json!({"values": [1, 2, 3, 4, 5]}));
        assert!(big.size_hint() > small.size_hint());
    }
}
