//! # The collector contract and its periodic timer.
//!
//! A collector owns the records and the aggregated state of one metrics
//! kind. Sampling is driven from outside by a [`CollectorTimer`]: the
//! metrics feature spawns one timer per collector at the configured period
//! and drops it on shutdown, which cancels the sampling task.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// One metrics kind: its sampling, its reducer, and its aggregated state.
///
/// ## Rules
/// - `sample()` must tolerate concurrent calls with `reduce()`; both run
///   from different tasks.
/// - `state_values_for` never fails: unknown subjects yield a stub record
///   holding only the subject field, so callers can always render a shape.
#[async_trait]
pub trait Collector: Send + Sync {
    /// Metrics kind (`"bus"`, `"host"`, `"process"`, `"http"`).
    fn kind(&self) -> &str;

    /// Subject field name of this kind's records.
    fn subject_key(&self) -> &str;

    /// Takes one sample: ticks the records and publishes their values on
    /// the metrics bus.
    async fn sample(&self);

    /// Folds one wire record (or an array of them) into the state.
    fn reduce(&self, values: &Value);

    /// Known subject names.
    fn subjects(&self) -> Vec<String>;

    /// Aggregated state for every subject.
    fn state_values(&self) -> Value;

    /// Aggregated state for one subject; a stub when the subject is unknown.
    fn state_values_for(&self, subject: &str) -> Value;

    /// Stub record for a subject this collector has never seen.
    fn stub_for(&self, subject: &str) -> Value {
        json!({ self.subject_key(): subject })
    }
}

/// Scoped handle over one collector's sampling task.
///
/// Dropping the timer cancels the task; no sampling outlives its owner.
pub struct CollectorTimer {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl CollectorTimer {
    /// Spawns a sampling loop for `collector` at the given period.
    ///
    /// The first sample fires after one full period, not immediately.
    #[must_use]
    pub fn spawn(collector: Arc<dyn Collector>, period: Duration) -> Self {
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period.max(Duration::from_millis(10)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    _ = ticker.tick() => collector.sample().await,
                }
            }
            debug!(kind = collector.kind(), "collector timer stopped");
        });
        Self { cancel, handle }
    }

    /// Stops the sampling loop.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the sampling task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for CollectorTimer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct CountingCollector {
        samples: AtomicU64,
    }

    #[async_trait]
    impl Collector for CountingCollector {
        fn kind(&self) -> &str {
            "test"
        }
        fn subject_key(&self) -> &str {
            "subject"
        }
        async fn sample(&self) {
            self.samples.fetch_add(1, Ordering::Relaxed);
        }
        fn reduce(&self, _values: &Value) {}
        fn subjects(&self) -> Vec<String> {
            Vec::new()
        }
        fn state_values(&self) -> Value {
            json!({})
        }
        fn state_values_for(&self, subject: &str) -> Value {
            self.stub_for(subject)
        }
    }

    #[tokio::test]
    async fn test_timer_samples_periodically_and_stops_on_drop() {
        let collector = Arc::new(CountingCollector {
            samples: AtomicU64::new(0),
        });
        let timer = CollectorTimer::spawn(collector.clone(), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(90)).await;
        let sampled = collector.samples.load(Ordering::Relaxed);
        assert!(sampled >= 2, "expected at least 2 samples, got {sampled}");

        drop(timer);
        tokio::time::sleep(Duration::from_millis(60)).await;
        let after_drop = collector.samples.load(Ordering::Relaxed);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(collector.samples.load(Ordering::Relaxed), after_drop);
    }

    #[tokio::test]
    async fn test_cancel_finishes_task() {
        let collector = Arc::new(CountingCollector {
            samples: AtomicU64::new(0),
        });
        let timer = CollectorTimer::spawn(collector, Duration::from_millis(20));
        timer.cancel();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(timer.is_finished());
    }

    #[test]
    fn test_stub_carries_only_the_subject_field() {
        let collector = CountingCollector {
            samples: AtomicU64::new(0),
        };
        assert_eq!(collector.stub_for("x"), json!({"subject": "x"}));
    }
}
