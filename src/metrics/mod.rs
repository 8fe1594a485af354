//! # Metrics records, collectors, reducers, and aggregated states.
//!
//! The metrics pipeline has three layers:
//!
//! ```text
//! live counters ──► Record.iteration() ──► bus publish ──► Reducer ──► State
//!   (per bus,          (snapshot +           {metric,       (fold      (per
//!    process,           running sums)         values[]}      by kind)   subject)
//!    host, http)
//! ```
//!
//! - [`MetricsRecord`] implementations snapshot live counters into wire
//!   values (`before` / `iteration` / `after`).
//! - [`Collector`] implementations run a periodic timer that samples their
//!   records and publishes onto the metrics bus channel.
//! - Reducers fold published values into a [`MetricsState`] keyed by subject
//!   (bus name, hostname, runtime uid, service).

mod bus;
mod collector;
mod duration;
mod host;
mod http;
mod process;
mod record;
mod state;

pub use bus::{BusCollector, BusMetricsRecord};
pub use collector::{Collector, CollectorTimer};
pub use duration::DurationMetric;
pub use host::{hostname, HostCollector, HostMetricsRecord};
pub use http::{HttpCollector, HttpCounters, HttpMetricsRecord};
pub use process::{runtime_uid, ProcessCollector, ProcessMetricsRecord};
pub use record::MetricsRecord;
pub use state::MetricsState;

/// Milliseconds since the unix epoch; the `ts` field of every wire record.
pub(crate) fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
