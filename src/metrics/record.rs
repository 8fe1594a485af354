//! # The metrics record contract.
//!
//! A record captures before/iteration/after snapshots of one monitored
//! subject and renders them as a JSON wire value. One instance exists per
//! monitored subject per collector; `before()` resets, `iteration()` mutates
//! incrementally from a live counter snapshot, `after()` finalizes.

use serde_json::Value;

/// Instrumentation primitive for any timed or counted operation.
///
/// ## Rules
/// - `values()` always contains `"metric": <name>`.
/// - `iteration()` must be cheap; it runs inside collector timers and
///   transaction settle paths.
pub trait MetricsRecord: Send {
    /// Metrics series name (`"duration"`, `"bus"`, `"host"`, ...).
    fn name(&self) -> &str;

    /// Resets/initializes the record before processing starts.
    fn before(&mut self);

    /// Captures one incremental snapshot from the live counters.
    fn iteration(&mut self);

    /// Finalizes the record after processing ends.
    fn after(&mut self);

    /// Renders the current values as a JSON wire record.
    fn values(&self) -> Value;
}
