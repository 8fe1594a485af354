//! # MessageBus: the channel-facing front of one engine.
//!
//! A [`MessageBus`] wraps an engine instance under its bus unique name and
//! adds receiver dispatch: [`msg_register`](MessageBus::msg_register) spawns
//! one worker per receiver that pulls messages from a subscription and calls
//! [`Receive::on_message`] with panic isolation.
//!
//! ## Rules
//! - A panicking receiver never takes down the dispatch worker or its bus.
//! - A lagging receiver loses overwritten messages and keeps going.
//! - `close()` cancels all dispatch workers and the engine transport.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::bus::{BusEngine, BusMessage, CountersSnapshot};
use crate::error::BusError;

/// A message consumer attached to a bus channel.
///
/// Implementations must ignore messages whose `sender` equals their own
/// name; the dispatch worker delivers everything it receives, including
/// self-published messages.
#[async_trait]
pub trait Receive: Send + Sync + 'static {
    /// Receiver name, compared against `msg.sender` for self-suppression.
    fn name(&self) -> &str;

    /// Handles one delivered message.
    async fn on_message(&self, msg: &BusMessage);
}

struct Inner {
    name: String,
    engine: Arc<dyn BusEngine>,
    cancel: CancellationToken,
}

/// Cheap-to-clone handle over one bus engine.
#[derive(Clone)]
pub struct MessageBus {
    inner: Arc<Inner>,
}

impl MessageBus {
    /// Wraps an engine under the given bus unique name.
    #[must_use]
    pub fn new(name: impl Into<String>, engine: Arc<dyn BusEngine>) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                engine,
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Bus unique name (`<node_name>_<feature_name>`).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Registers a channel on the engine (idempotent).
    pub fn channel_add(&self, channel: &str) {
        self.inner.engine.channel_add(channel);
    }

    /// Publishes a payload on a channel under the given sender name.
    pub fn publish(
        &self,
        channel: &str,
        sender: &str,
        payload: Value,
    ) -> Result<(), BusError> {
        self.inner
            .engine
            .publish(BusMessage::new(channel, sender, payload))
    }

    /// Attaches a receiver to a channel.
    ///
    /// Spawns a dispatch worker that runs until the bus closes or the
    /// channel's queue is dropped. Each delivered message is handed to the
    /// receiver inside a panic guard.
    pub fn msg_register(
        &self,
        channel: &str,
        receiver: Arc<dyn Receive>,
    ) -> Result<(), BusError> {
        let mut rx = self.inner.engine.subscribe(channel)?;
        let cancel = self.inner.cancel.child_token();
        let bus_name = self.inner.name.clone();
        let channel = channel.to_string();

        tokio::spawn(async move {
            loop {
                let msg = tokio::select! {
                    _ = cancel.cancelled() => break,
                    msg = rx.recv() => msg,
                };
                match msg {
                    Ok(msg) => {
                        let delivery = AssertUnwindSafe(receiver.on_message(&msg));
                        if delivery.catch_unwind().await.is_err() {
                            warn!(
                                bus = %bus_name,
                                channel = %channel,
                                receiver = receiver.name(),
                                "receiver panicked; message dropped"
                            );
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(
                            bus = %bus_name,
                            channel = %channel,
                            receiver = receiver.name(),
                            skipped,
                            "receiver lagged; messages lost"
                        );
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!(bus = %bus_name, channel = %channel, "dispatch worker stopped");
        });
        Ok(())
    }

    /// Drains the engine's traffic counters for one collection period.
    #[must_use]
    pub fn drain_counters(&self) -> CountersSnapshot {
        self.inner.engine.counters().snapshot_and_reset()
    }

    /// Cancels dispatch workers and closes the engine transport.
    pub fn close(&self) {
        self.inner.cancel.cancel();
        self.inner.engine.close();
    }
}

impl std::fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBus")
            .field("name", &self.inner.name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::StreamBusEngine;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    struct Sink {
        name: String,
        got: Mutex<Vec<BusMessage>>,
        panic_on: Option<Value>,
    }

    impl Sink {
        fn new(name: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.into(),
                got: Mutex::new(Vec::new()),
                panic_on: None,
            })
        }
    }

    #[async_trait]
    impl Receive for Sink {
        fn name(&self) -> &str {
            &self.name
        }

        async fn on_message(&self, msg: &BusMessage) {
            if let Some(bad) = &self.panic_on {
                if &msg.payload == bad {
                    panic!("sink exploded");
                }
            }
            self.got.lock().unwrap().push(msg.clone());
        }
    }

    fn bus(name: &str) -> MessageBus {
        MessageBus::new(name, Arc::new(StreamBusEngine::new(name, 16)))
    }

    #[tokio::test]
    async fn test_registered_receiver_gets_published_messages() {
        let bus = bus("node_a_msg_bus");
        bus.channel_add("msg");
        let sink = Sink::new("metrics_server");
        bus.msg_register("msg", sink.clone()).unwrap();

        bus.publish("msg", "node_b_msg_bus", json!({"n": 1})).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let got = sink.got.lock().unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].sender, "node_b_msg_bus");
    }

    #[tokio::test]
    async fn test_register_on_unknown_channel_fails() {
        let bus = bus("node_a_msg_bus");
        let err = bus.msg_register("nope", Sink::new("s")).unwrap_err();
        assert!(matches!(err, BusError::ChannelUnknown { .. }));
    }

    #[tokio::test]
    async fn test_panicking_receiver_keeps_receiving() {
        let bus = bus("node_a_msg_bus");
        bus.channel_add("metrics");
        let sink = Arc::new(Sink {
            name: "metrics_server".into(),
            got: Mutex::new(Vec::new()),
            panic_on: Some(json!("boom")),
        });
        bus.msg_register("metrics", sink.clone()).unwrap();

        bus.publish("metrics", "x", json!("boom")).unwrap();
        bus.publish("metrics", "x", json!("fine")).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let got = sink.got.lock().unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].payload, json!("fine"));
    }

    #[tokio::test]
    async fn test_close_stops_dispatch() {
        let bus = bus("node_a_msg_bus");
        bus.channel_add("msg");
        let sink = Sink::new("s");
        bus.msg_register("msg", sink.clone()).unwrap();
        bus.close();
        tokio::time::sleep(Duration::from_millis(20)).await;

        bus.publish("msg", "x", json!(1)).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(sink.got.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_drain_counters_reports_period_deltas() {
        let bus = bus("node_a_msg_bus");
        bus.channel_add("msg");
        bus.publish("msg", "x", json!(1)).unwrap();
        bus.publish("msg", "x", json!(2)).unwrap();

        let snap = bus.drain_counters();
        assert_eq!(snap.msg_count, 2);
        assert_eq!(bus.drain_counters().msg_count, 0);
    }
}
