//! Error types used by the txvisor runtime, transactions, and buses.
//!
//! This module defines three main error enums:
//!
//! - [`ExecError`] — errors raised by individual executable steps.
//! - [`BusError`] — errors raised by the message bus layer and its engines.
//! - [`RuntimeError`] — errors raised by the node runtime itself (boot stages,
//!   receiver boundary assertions).
//!
//! All types provide `as_label` helpers (short stable snake_case strings) for
//! logs and metrics.
//!
//! ## Propagation rules
//! - An [`ExecError`] never crosses the transaction boundary: the owning
//!   [`Transaction`](crate::Transaction) converts it into a recorded step
//!   failure and resolves to `false`.
//! - [`BusError::EngineResolution`] is fatal for the bus feature that hit it,
//!   but never a process crash.
//! - [`RuntimeError::MalformedLogRecord`] / `MalformedMetricsRecord` abort the
//!   processing of one message only; the receiver survives.

use thiserror::Error;

/// # Errors produced by executable steps.
///
/// Recorded per-step by the owning transaction; some are fail-fast
/// (`InvalidContext`), others only surface in the step results.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    /// The base executable was invoked without an override.
    #[error("execute is not implemented for [{name}]")]
    NotImplemented {
        /// Name of the executable missing an implementation.
        name: String,
    },

    /// `prepare()` was called with a context missing the runtime handle.
    #[error("invalid execution context for [{name}]: missing runtime handle")]
    InvalidContext {
        /// Name of the executable that rejected the context.
        name: String,
    },

    /// The unit of work failed; recorded in the step results, never rethrown.
    #[error("execution failed: {error}")]
    Failed {
        /// The underlying failure message.
        error: String,
    },
}

impl ExecError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use txvisor::ExecError;
    ///
    /// let err = ExecError::Failed { error: "boom".into() };
    /// assert_eq!(err.as_label(), "exec_failed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ExecError::NotImplemented { .. } => "exec_not_implemented",
            ExecError::InvalidContext { .. } => "exec_invalid_context",
            ExecError::Failed { .. } => "exec_failed",
        }
    }

    /// Shorthand for a [`ExecError::Failed`] with the given message.
    pub fn failed(msg: impl Into<String>) -> Self {
        ExecError::Failed { error: msg.into() }
    }
}

/// # Errors produced by the message bus layer.
///
/// Transport faults are counted in the owning engine's
/// [`BusCounters`](crate::BusCounters) as `errors_count`.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum BusError {
    /// No engine factory is registered under the requested package name.
    ///
    /// The feature that requested the engine must treat this as fatal for
    /// itself (degraded node), not as a process crash.
    #[error("no bus engine registered for package [{package}]")]
    EngineResolution {
        /// The package name that failed to resolve.
        package: String,
    },

    /// Publish or subscribe on a channel that was never added to the engine.
    #[error("unknown channel [{channel}] on bus engine [{engine}]")]
    ChannelUnknown {
        /// The missing channel name.
        channel: String,
        /// The engine that rejected the operation.
        engine: String,
    },

    /// The engine's transport is closed (no receivers / peer gone).
    #[error("bus engine [{engine}] is closed")]
    Closed {
        /// The engine that is closed.
        engine: String,
    },

    /// Underlying socket transport failure.
    #[error("bus transport i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A wire frame could not be encoded or decoded.
    #[error("bus codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

impl BusError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            BusError::EngineResolution { .. } => "bus_engine_resolution",
            BusError::ChannelUnknown { .. } => "bus_channel_unknown",
            BusError::Closed { .. } => "bus_closed",
            BusError::Io(_) => "bus_io",
            BusError::Codec(_) => "bus_codec",
        }
    }
}

/// # Errors produced by the node runtime.
///
/// These represent failures in the runtime system itself: staged boot
/// failures and receiver boundary assertions.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// A boot stage failed; the runtime must not advance to serving.
    #[error("boot stage [{stage}] failed: {reason}")]
    BootFailed {
        /// Name of the failed stage executable.
        stage: String,
        /// Failure reason collected from the step results.
        reason: String,
    },

    /// A logs wire record is missing a required field or carries an empty one.
    #[error("malformed log record: {reason}")]
    MalformedLogRecord {
        /// What the receiver boundary assertion rejected.
        reason: String,
    },

    /// A metrics wire record does not match the declared kind or shape.
    #[error("malformed metrics record: {reason}")]
    MalformedMetricsRecord {
        /// What the receiver boundary assertion rejected.
        reason: String,
    },

    /// A feature was asked to load before its bus was available.
    #[error("feature [{feature}] requires bus [{bus}] which is not loaded")]
    BusUnavailable {
        /// The feature that failed to load.
        feature: String,
        /// The missing bus name.
        bus: String,
    },

    /// The topology document could not be read or parsed.
    #[error("topology loading failed: {reason}")]
    TopologyInvalid {
        /// Parse or read failure description.
        reason: String,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::BootFailed { .. } => "runtime_boot_failed",
            RuntimeError::MalformedLogRecord { .. } => "runtime_malformed_log_record",
            RuntimeError::MalformedMetricsRecord { .. } => "runtime_malformed_metrics_record",
            RuntimeError::BusUnavailable { .. } => "runtime_bus_unavailable",
            RuntimeError::TopologyInvalid { .. } => "runtime_topology_invalid",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exec_error_labels() {
        let e = ExecError::NotImplemented { name: "base".into() };
        assert_eq!(e.as_label(), "exec_not_implemented");
        let e = ExecError::InvalidContext { name: "stage 0".into() };
        assert_eq!(e.as_label(), "exec_invalid_context");
    }

    #[test]
    fn test_bus_error_display_carries_names() {
        let e = BusError::ChannelUnknown {
            channel: "metrics".into(),
            engine: "msg_bus_engine".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("metrics"));
        assert!(msg.contains("msg_bus_engine"));
    }

    #[test]
    fn test_runtime_error_labels() {
        let e = RuntimeError::MalformedLogRecord { reason: "missing ts".into() };
        assert_eq!(e.as_label(), "runtime_malformed_log_record");
    }
}
