//! # Message bus layer: channel-based pub/sub between node features.
//!
//! ```text
//! Publishers (features, collectors):        Receivers (servers):
//!   publish(channel, sender, payload)
//!        │                                        ▲
//!        ▼                                        │ on_message(&BusMessage)
//!   MessageBus ───► BusEngine ───► channel ───► dispatch worker (per receiver)
//!                  (stream / socket / custom)
//! ```
//!
//! ## Rules
//! - Delivery is **best-effort**, at-most-once per receiver per message;
//!   no durability, no cross-sender ordering.
//! - A channel must be added (`channel_add`) before publish/subscribe.
//! - Receivers must ignore their own previously-sent messages
//!   (sender-equals-self check) to avoid feedback loops.
//! - Engines are resolved by package name in the [`EngineRegistry`], never by
//!   runtime module loading.

mod counters;
mod engine;
mod message;
mod message_bus;
mod registry;
mod socket;
mod stream;

pub use counters::{BusCounters, CountersSnapshot};
pub use engine::BusEngine;
pub use message::BusMessage;
pub use message_bus::{MessageBus, Receive};
pub use registry::EngineRegistry;
pub use socket::SocketBusEngine;
pub use stream::StreamBusEngine;
