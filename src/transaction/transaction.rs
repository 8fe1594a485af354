//! # The transaction orchestrator.
//!
//! Runs its executables under the selected [`TxType`], records one
//! [`StepResult`] per settled executable, then commits (`exec_ack` on every
//! executable) or rolls back (`exec_fail` on every executable).
//!
//! ## Failure semantics
//! An error anywhere inside an executable — a returned `ExecError`, a flipped
//! error flag, or a panic inside its future — is converted into a recorded
//! step failure. `execute()` resolves to a boolean; callers must treat that
//! boolean as authoritative and may inspect [`Transaction::first_error`].

use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::ExecError;
use crate::exec::{ExecContext, Executable, ExecutableRef};
use crate::metrics::{DurationMetric, MetricsRecord};

use super::{is_truthy, StepResult, TxStatus, TxType};

/// Orchestrates a set of executables under one execution strategy.
///
/// The transaction exclusively owns its executables and result log for its
/// lifetime; it is created fresh per invocation (e.g. once per runtime boot).
///
/// # Example
/// ```
/// use serde_json::{json, Value};
/// use txvisor::{ExecContext, ExecError, ExecFn, Transaction, TxStatus, TxType};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let steps = vec![
///     ExecFn::boxed("a", |_ctx, _data| async { Ok::<Value, ExecError>(json!(true)) }),
///     ExecFn::boxed("b", |_ctx, _data| async { Ok::<Value, ExecError>(json!(true)) }),
/// ];
/// let mut tx = Transaction::new("app", "svc", "boot", steps, TxType::Sequence);
/// tx.prepare(&ExecContext::empty()).expect("prepare");
/// assert!(tx.execute(None).await);
/// assert_eq!(tx.status(), TxStatus::ExecOk);
/// # }
/// ```
pub struct Transaction {
    app: String,
    service: String,
    name: String,
    executables: Vec<ExecutableRef>,
    results: Vec<StepResult>,
    tx_type: TxType,
    status: TxStatus,
    metric_duration: DurationMetric,
}

impl Transaction {
    /// Creates a transaction in status `Created`.
    pub fn new(
        app: impl Into<String>,
        service: impl Into<String>,
        name: impl Into<String>,
        executables: Vec<ExecutableRef>,
        tx_type: TxType,
    ) -> Self {
        Self {
            app: app.into(),
            service: service.into(),
            name: name.into(),
            executables,
            results: Vec::new(),
            tx_type,
            status: TxStatus::Created,
            metric_duration: DurationMetric::new(),
        }
    }

    /// Appends an executable; registration order is significant for
    /// [`TxType::Sequence`].
    pub fn add_executable(&mut self, exec: ExecutableRef) {
        self.executables.push(exec);
    }

    /// Prepares every executable with `ctx`, clears the result log, and
    /// re-arms the state machine to `Prepared` regardless of any prior
    /// `ExecOk` / `ExecKo`.
    pub fn prepare(&mut self, ctx: &ExecContext) -> Result<(), ExecError> {
        for exec in &mut self.executables {
            exec.prepare(ctx)?;
        }
        self.results.clear();
        self.status = TxStatus::Prepared;
        Ok(())
    }

    /// Executes all executables under the selected strategy, then commits or
    /// rolls back.
    ///
    /// Returns the authoritative outcome boolean. Never returns an error:
    /// every executable failure is recorded in [`results`](Self::results)
    /// and answered with a rollback.
    pub async fn execute(&mut self, data: Option<&Value>) -> bool {
        if self.status != TxStatus::Prepared {
            warn!(
                tx = %self.id(),
                status = self.status.as_str(),
                "execute called on a transaction that is not prepared"
            );
            self.rollback();
            return false;
        }

        self.metric_duration.before();
        let ok = match self.tx_type {
            TxType::Sequence => self.execute_sequence(data).await,
            TxType::Every => self.execute_every(data).await,
            TxType::One => self.execute_one(data).await,
        };
        self.metric_duration.after();

        if ok {
            self.commit();
        } else {
            self.rollback();
        }
        ok
    }

    /// Sequence strategy: strict registration order, one at a time.
    ///
    /// A falsy-but-error-free intermediate result does **not** short-circuit
    /// the remaining steps (decided policy: only errors mark failure, the
    /// aggregate decides). Overall success requires no errored step and a
    /// truthy final result.
    async fn execute_sequence(&mut self, data: Option<&Value>) -> bool {
        let Self {
            executables,
            results,
            metric_duration,
            ..
        } = self;

        let mut last_truthy = true;
        for (index, exec) in executables.iter_mut().enumerate() {
            let step = settle_one(index, exec.as_mut(), data).await;
            if step.has_error {
                warn!(
                    step = index,
                    name = %step.name,
                    error = step.result.error_msg.as_deref().unwrap_or("unknown"),
                    "sequence step failed"
                );
            } else if !step.truthy {
                debug!(step = index, name = %step.name, "sequence step settled falsy");
            }
            last_truthy = step.truthy;
            metric_duration.iteration();
            results.push(step.result);
        }

        results.iter().all(|r| !r.has_error) && last_truthy
    }

    /// Every strategy: all start concurrently; commit only when every step
    /// settled truthy and error-free. Every index appears in the results
    /// exactly once; completion order is unconstrained.
    async fn execute_every(&mut self, data: Option<&Value>) -> bool {
        let Self {
            executables,
            results,
            metric_duration,
            ..
        } = self;

        let mut pending: FuturesUnordered<_> = executables
            .iter_mut()
            .enumerate()
            .map(|(index, exec)| settle_one(index, exec.as_mut(), data))
            .collect();

        let mut all_ok = true;
        while let Some(step) = pending.next().await {
            metric_duration.iteration();
            if !step.truthy {
                all_ok = false;
            }
            results.push(step.result);
        }
        all_ok
    }

    /// One strategy: all start concurrently; the **first** settled step
    /// decides the outcome. Later-settling steps still append their results
    /// but never flip the already-decided outcome.
    async fn execute_one(&mut self, data: Option<&Value>) -> bool {
        let Self {
            executables,
            results,
            metric_duration,
            ..
        } = self;

        let mut pending: FuturesUnordered<_> = executables
            .iter_mut()
            .enumerate()
            .map(|(index, exec)| settle_one(index, exec.as_mut(), data))
            .collect();

        let mut decision: Option<bool> = None;
        while let Some(step) = pending.next().await {
            metric_duration.iteration();
            if decision.is_none() {
                decision = Some(step.truthy);
            }
            results.push(step.result);
        }
        decision.unwrap_or(false)
    }

    /// Commits: `exec_ack()` on every executable, status `ExecOk`.
    fn commit(&mut self) {
        for exec in &mut self.executables {
            exec.exec_ack();
        }
        self.status = TxStatus::ExecOk;
    }

    /// Rolls back: `exec_fail()` on every executable, status `ExecKo`, and a
    /// diagnostic dump of every collected step result.
    fn rollback(&mut self) {
        for exec in &mut self.executables {
            exec.exec_fail();
        }
        self.status = TxStatus::ExecKo;

        for result in &self.results {
            warn!(
                tx = %self.id(),
                step = result.index,
                has_error = result.has_error,
                error = result.error_msg.as_deref().unwrap_or(""),
                "rollback step result"
            );
        }
    }

    /// Finishes every executable; called once after the transaction
    /// concluded.
    pub fn finish(&mut self) {
        for exec in &mut self.executables {
            exec.finish();
        }
    }

    /// Transaction identifier: `app/service/name`.
    pub fn id(&self) -> String {
        format!("{}/{}/{}", self.app, self.service, self.name)
    }

    /// Current lifecycle status.
    #[must_use]
    pub fn status(&self) -> TxStatus {
        self.status
    }

    /// Execution strategy selected at construction.
    #[must_use]
    pub fn tx_type(&self) -> TxType {
        self.tx_type
    }

    /// All recorded step results.
    #[must_use]
    pub fn results(&self) -> &[StepResult] {
        &self.results
    }

    /// Result of the first settled executable, if any settled.
    #[must_use]
    pub fn first_result(&self) -> Option<&StepResult> {
        self.results.first()
    }

    /// Result of the first settled executable that failed, if any.
    #[must_use]
    pub fn first_error(&self) -> Option<&StepResult> {
        self.results.iter().find(|r| r.has_error)
    }

    /// Transaction metrics snapshot: `{id, status, metrics: [...]}`.
    pub fn metrics_values(&self) -> Value {
        json!({
            "id": self.id(),
            "status": self.status.as_str(),
            "metrics": [self.metric_duration.values()],
        })
    }
}

/// Outcome of settling one executable, carried back to the strategy loops.
struct Settled {
    name: String,
    result: StepResult,
    has_error: bool,
    truthy: bool,
}

/// Runs one executable to settlement, converting returned errors, flipped
/// error flags, and panics into a recorded step outcome.
async fn settle_one(index: usize, exec: &mut dyn Executable, data: Option<&Value>) -> Settled {
    let name = exec.name().to_string();
    let outcome = std::panic::AssertUnwindSafe(exec.execute(data))
        .catch_unwind()
        .await;

    match outcome {
        Ok(Ok(value)) => {
            let has_error = exec.has_error();
            let error_msg = exec.error_msg().map(str::to_string);
            let truthy = !has_error && is_truthy(&value);
            Settled {
                name,
                result: StepResult {
                    index,
                    result: Some(value),
                    has_error,
                    error_msg,
                },
                has_error,
                truthy,
            }
        }
        Ok(Err(err)) => Settled {
            name,
            result: StepResult {
                index,
                result: None,
                has_error: true,
                error_msg: Some(err.to_string()),
            },
            has_error: true,
            truthy: false,
        },
        Err(panic) => {
            let msg = panic_message(panic);
            warn!(step = index, name = %name, panic = %msg, "executable panicked");
            Settled {
                name,
                result: StepResult {
                    index,
                    result: None,
                    has_error: true,
                    error_msg: Some(format!("panic: {msg}")),
                },
                has_error: true,
                truthy: false,
            }
        }
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
