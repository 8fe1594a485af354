//! # Bus-facing servers.
//!
//! Servers are [`Receive`](crate::Receive) implementations attached to bus
//! channels by the node features:
//!
//! - [`MetricsServer`] consumes `"metrics"` records, validates them, and
//!   dispatches them to the registered collectors' reducers.
//! - [`LogsServer`] consumes `"logs"` records, validates them, and re-emits
//!   them through the local logger at their carried level.
//!
//! ## Rules
//! - Both suppress messages whose sender equals their own name.
//! - A malformed record aborts that record only: logged, dropped, the
//!   server keeps serving.

mod logs_server;
mod metrics_server;

pub use logs_server::LogsServer;
pub use metrics_server::MetricsServer;
