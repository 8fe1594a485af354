//! # The bus engine contract.

use tokio::sync::broadcast;

use crate::bus::{BusCounters, BusMessage};
use crate::error::BusError;

/// Transport backend of a [`MessageBus`](crate::MessageBus).
///
/// An engine owns its channels and its [`BusCounters`]. Implementations must
/// be cheap to share behind an `Arc` and safe to call from any task.
///
/// ## Rules
/// - `channel_add` is idempotent; adding an existing channel is a no-op.
/// - `publish` on an unknown channel is a counted error, never a panic.
/// - `publish` with zero subscribers succeeds; the message is dropped.
pub trait BusEngine: Send + Sync {
    /// Engine instance name (bus unique name).
    fn name(&self) -> &str;

    /// Registers a channel, creating its backing queue if missing.
    fn channel_add(&self, channel: &str);

    /// Publishes a message on its channel.
    fn publish(&self, msg: BusMessage) -> Result<(), BusError>;

    /// Opens a subscription on a channel.
    ///
    /// The returned receiver observes messages published after this call.
    fn subscribe(&self, channel: &str) -> Result<broadcast::Receiver<BusMessage>, BusError>;

    /// The engine's traffic counters.
    fn counters(&self) -> &BusCounters;

    /// Releases transport resources. Default: no-op.
    fn close(&self) {}
}

impl std::fmt::Debug for dyn BusEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusEngine").field("name", &self.name()).finish()
    }
}
