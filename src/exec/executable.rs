//! # The executable contract.
//!
//! An [`Executable`] is a single unit of work with a
//! prepare/execute/commit/rollback/finish lifecycle and an error flag.
//!
//! ## Lifecycle
//! ```text
//! factory ──► prepare(ctx) ──► execute(data) ──► exec_ack()   (commit)
//!                │                  │        └─► exec_fail()  (rollback)
//!                │                  ▼
//!                │             has_error() / error_msg()
//!                └──────────────────────────────► finish()    (once, at end)
//! ```
//!
//! ## Rules
//! - An executable is owned by exactly one transaction per run; it is
//!   stateless between runs except for the accumulated error state, which
//!   `prepare` resets.
//! - `execute` errors are recorded by the owning transaction, never rethrown
//!   to the transaction's caller.
//! - Executables never mutate the transaction's results or status; they only
//!   flip their own error flag.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ExecError;

use super::ExecContext;

/// Boxed executable handle, owned by a [`Transaction`](crate::Transaction).
pub type ExecutableRef = Box<dyn Executable>;

/// # Asynchronous unit of work with commit/rollback hooks.
///
/// Concrete implementations override [`execute`](Executable::execute); the
/// documented base behavior is to fail with [`ExecError::NotImplemented`].
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use serde_json::Value;
/// use txvisor::{ExecContext, ExecError, ExecStatus, Executable};
///
/// struct Demo {
///     status: ExecStatus,
/// }
///
/// #[async_trait]
/// impl Executable for Demo {
///     fn name(&self) -> &str { "demo" }
///
///     fn prepare(&mut self, _ctx: &ExecContext) -> Result<(), ExecError> {
///         self.status.clear();
///         Ok(())
///     }
///
///     async fn execute(&mut self, _data: Option<&Value>) -> Result<Value, ExecError> {
///         Ok(Value::Bool(true))
///     }
///
///     fn status(&self) -> &ExecStatus { &self.status }
///     fn status_mut(&mut self) -> &mut ExecStatus { &mut self.status }
/// }
/// ```
#[async_trait]
pub trait Executable: Send {
    /// Returns a stable, human-readable executable name.
    fn name(&self) -> &str;

    /// Stores the execution context and resets accumulated error state.
    ///
    /// Fails with [`ExecError::InvalidContext`] when the context lacks a
    /// field this executable requires (stage executables require the runtime
    /// handle). Called once per transaction run.
    fn prepare(&mut self, ctx: &ExecContext) -> Result<(), ExecError>;

    /// Performs the unit of work.
    ///
    /// The returned value's *truthiness* participates in the owning
    /// transaction's outcome; see
    /// [`is_truthy`](crate::transaction::is_truthy).
    async fn execute(&mut self, data: Option<&Value>) -> Result<Value, ExecError>;

    /// Post-execution error state.
    fn status(&self) -> &ExecStatus;

    /// Mutable access to the error state (used by implementations).
    fn status_mut(&mut self) -> &mut ExecStatus;

    /// True when the last execution flagged an error.
    fn has_error(&self) -> bool {
        self.status().has_error()
    }

    /// Error message from the last execution, if any.
    fn error_msg(&self) -> Option<&str> {
        self.status().message()
    }

    /// Called by the owning transaction on commit; persist side effects.
    fn exec_ack(&mut self) {}

    /// Called by the owning transaction on rollback; discard side effects.
    fn exec_fail(&mut self) {}

    /// Releases held resources; called once after the transaction concludes.
    fn finish(&mut self) {}
}

/// Accumulated error state of one executable.
///
/// Reset by `prepare`, set during `execute`, queried by the owning
/// transaction after each step settles.
#[derive(Clone, Debug, Default)]
pub struct ExecStatus {
    error: Option<String>,
}

impl ExecStatus {
    /// Fresh, error-free status.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears the error flag (called from `prepare`).
    pub fn clear(&mut self) {
        self.error = None;
    }

    /// Flags an error with the given message.
    pub fn set_error(&mut self, msg: impl Into<String>) {
        self.error = Some(msg.into());
    }

    /// True when an error was flagged since the last `clear`.
    #[must_use]
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// The flagged error message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_clear_resets_error() {
        let mut st = ExecStatus::new();
        st.set_error("boom");
        assert!(st.has_error());
        assert_eq!(st.message(), Some("boom"));
        st.clear();
        assert!(!st.has_error());
        assert!(st.message().is_none());
    }
}
