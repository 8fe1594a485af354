//! # Per-bus traffic counters.
//!
//! Every engine owns one [`BusCounters`]. Publishers and dispatch workers
//! bump the atomics; the bus metrics collector drains them with
//! [`snapshot_and_reset`](BusCounters::snapshot_and_reset) once per sample so
//! each period reports deltas, not lifetime totals.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic in-period counters for one bus engine.
#[derive(Debug, Default)]
pub struct BusCounters {
    msg_count: AtomicU64,
    msg_size: AtomicU64,
    errors_count: AtomicU64,
    subscribers_count: AtomicU64,
}

/// A drained snapshot of [`BusCounters`], covering one collection period.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CountersSnapshot {
    /// Messages published in the period.
    pub msg_count: u64,
    /// Approximate total payload bytes published in the period.
    pub msg_size: u64,
    /// Transport/codec/channel errors in the period.
    pub errors_count: u64,
    /// Subscriptions opened in the period.
    pub subscribers_count: u64,
}

impl BusCounters {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one published message of the given approximate size.
    pub fn record_message(&self, size: u64) {
        self.msg_count.fetch_add(1, Ordering::Relaxed);
        self.msg_size.fetch_add(size, Ordering::Relaxed);
    }

    /// Records one bus-level error.
    pub fn record_error(&self) {
        self.errors_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one new subscription.
    pub fn record_subscriber(&self) {
        self.subscribers_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Drains all counters to zero and returns what they held.
    ///
    /// Concurrent publishes during the drain land in the next period.
    pub fn snapshot_and_reset(&self) -> CountersSnapshot {
        CountersSnapshot {
            msg_count: self.msg_count.swap(0, Ordering::Relaxed),
            msg_size: self.msg_size.swap(0, Ordering::Relaxed),
            errors_count: self.errors_count.swap(0, Ordering::Relaxed),
            subscribers_count: self.subscribers_count.swap(0, Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_drains_to_zero() {
        let c = BusCounters::new();
        c.record_message(10);
        c.record_message(20);
        c.record_error();
        c.record_subscriber();

        let snap = c.snapshot_and_reset();
        assert_eq!(snap.msg_count, 2);
        assert_eq!(snap.msg_size, 30);
        assert_eq!(snap.errors_count, 1);
        assert_eq!(snap.subscribers_count, 1);

        let empty = c.snapshot_and_reset();
        assert_eq!(empty, CountersSnapshot::default());
    }
}
