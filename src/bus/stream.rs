//! # In-process stream engine (`"default"` package).
//!
//! Backs each channel with a tokio broadcast ring of fixed capacity. Slow
//! subscribers that fall more than `capacity` messages behind lose the
//! overwritten messages (lossy by design of the delivery contract).

use std::collections::HashMap;
use std::sync::RwLock;

use tokio::sync::broadcast;

use crate::bus::{BusCounters, BusEngine, BusMessage};
use crate::error::BusError;

/// Broadcast-based in-process bus engine.
pub struct StreamBusEngine {
    name: String,
    capacity: usize,
    channels: RwLock<HashMap<String, broadcast::Sender<BusMessage>>>,
    counters: BusCounters,
}

impl StreamBusEngine {
    /// Creates an engine with the given channel ring capacity.
    #[must_use]
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            capacity: capacity.max(1),
            channels: RwLock::new(HashMap::new()),
            counters: BusCounters::new(),
        }
    }

    fn sender_for(&self, channel: &str) -> Option<broadcast::Sender<BusMessage>> {
        let channels = self.channels.read().unwrap_or_else(|p| p.into_inner());
        channels.get(channel).cloned()
    }
}

impl BusEngine for StreamBusEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn channel_add(&self, channel: &str) {
        let mut channels = self.channels.write().unwrap_or_else(|p| p.into_inner());
        channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0);
    }

    fn publish(&self, msg: BusMessage) -> Result<(), BusError> {
        let Some(sender) = self.sender_for(&msg.channel) else {
            self.counters.record_error();
            return Err(BusError::ChannelUnknown {
                channel: msg.channel,
                engine: self.name.clone(),
            });
        };
        self.counters.record_message(msg.size_hint());
        // No subscribers is fine: the message is simply dropped.
        let _ = sender.send(msg);
        Ok(())
    }

    fn subscribe(&self, channel: &str) -> Result<broadcast::Receiver<BusMessage>, BusError> {
        let Some(sender) = self.sender_for(channel) else {
            self.counters.record_error();
            return Err(BusError::ChannelUnknown {
                channel: channel.to_string(),
                engine: self.name.clone(),
            });
        };
        self.counters.record_subscriber();
        Ok(sender.subscribe())
    }

    fn counters(&self) -> &BusCounters {
        &self.counters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_channel_add_is_idempotent() {
        let engine = StreamBusEngine::new("e", 8);
        engine.channel_add("metrics");
        let mut rx = engine.subscribe("metrics").unwrap();
        engine.channel_add("metrics");

        engine
            .publish(BusMessage::new("metrics", "s", json!(1)))
            .unwrap();
        // The pre-existing subscription survives the second add.
        assert_eq!(rx.try_recv().unwrap().payload, json!(1));
    }

    #[test]
    fn test_publish_unknown_channel_is_counted_error() {
        let engine = StreamBusEngine::new("e", 8);
        let err = engine
            .publish(BusMessage::new("nope", "s", json!(null)))
            .unwrap_err();
        assert!(matches!(err, BusError::ChannelUnknown { .. }));
        assert_eq!(engine.counters().snapshot_and_reset().errors_count, 1);
    }

    #[test]
    fn test_publish_without_subscribers_succeeds() {
        let engine = StreamBusEngine::new("e", 8);
        engine.channel_add("logs");
        engine
            .publish(BusMessage::new("logs", "s", json!("dropped")))
            .unwrap();
        assert_eq!(engine.counters().snapshot_and_reset().msg_count, 1);
    }

    #[tokio::test]
    async fn test_two_subscribers_both_receive() {
        let engine = StreamBusEngine::new("e", 8);
        engine.channel_add("msg");
        let mut a = engine.subscribe("msg").unwrap();
        let mut b = engine.subscribe("msg").unwrap();

        engine
            .publish(BusMessage::new("msg", "node_a_msg_bus", json!({"n": 1})))
            .unwrap();

        assert_eq!(a.recv().await.unwrap().payload["n"], 1);
        assert_eq!(b.recv().await.unwrap().payload["n"], 1);
    }
}
