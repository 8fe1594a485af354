//! # Transactions: grouped executions with commit/rollback semantics.
//!
//! A [`Transaction`] runs a set of [`Executable`](crate::Executable)s under
//! one of three strategies and aggregates their outcome:
//!
//! - **Sequence**: strict registration order, one at a time.
//! - **Every**: all start concurrently, join semantics (all must pass).
//! - **One**: all start concurrently, the first settled one decides.
//!
//! ## State machine
//! ```text
//! Created ──prepare()──► Prepared ──execute()──► ExecOk
//!                           ▲                └──► ExecKo
//!                           └──────prepare()──────┘   (re-arms, clears results)
//! ```
//!
//! ## Rules
//! - Executable-level failures are **always** caught and recorded as step
//!   results; `execute()` returns a boolean, never an error.
//! - `results.len() <= executables.len()` at all times; after `execute()`
//!   returns, status is `ExecOk` or `ExecKo`, never `Prepared`.
//! - Only the transaction mutates its results and status; executables only
//!   flip their own error flag.

mod transaction;

pub use transaction::Transaction;

use serde::Serialize;
use serde_json::Value;

/// Transaction execution strategy, selected at construction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TxType {
    /// Run one at a time in registration order.
    Sequence,
    /// Run all concurrently; commit only when every step passes.
    #[default]
    Every,
    /// Run all concurrently; the first settled step decides the outcome.
    One,
}

impl TxType {
    /// Stable uppercase label (wire/log form).
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TxType::Sequence => "SEQUENCE",
            TxType::Every => "EVERY",
            TxType::One => "ONE",
        }
    }
}

/// Transaction lifecycle status.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TxStatus {
    /// Built, not yet prepared.
    #[default]
    Created,
    /// Prepared; ready for exactly one `execute()`.
    Prepared,
    /// Last execution committed.
    ExecOk,
    /// Last execution rolled back.
    ExecKo,
}

impl TxStatus {
    /// Stable uppercase label (wire/log form).
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TxStatus::Created => "CREATED",
            TxStatus::Prepared => "PREPARED",
            TxStatus::ExecOk => "EXEC_OK",
            TxStatus::ExecKo => "EXEC_KO",
        }
    }
}

/// Settled outcome of one executable step.
#[derive(Clone, Debug, Serialize)]
pub struct StepResult {
    /// Registration index of the executable.
    pub index: usize,
    /// The settled value; `None` when the step failed with an error.
    pub result: Option<Value>,
    /// Whether the step flagged or raised an error.
    pub has_error: bool,
    /// The step's error message, if any.
    pub error_msg: Option<String>,
}

/// Truthiness of a step result value, preserving the original semantics:
/// falsy values are `null`, `false`, the number `0`, and the empty string.
///
/// # Example
/// ```
/// use serde_json::json;
/// use txvisor::transaction::is_truthy;
///
/// assert!(is_truthy(&json!(true)));
/// assert!(is_truthy(&json!({"loaded": 1})));
/// assert!(!is_truthy(&json!(false)));
/// assert!(!is_truthy(&json!(0)));
/// assert!(!is_truthy(&json!("")));
/// assert!(!is_truthy(&json!(null)));
/// ```
#[must_use]
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_labels_are_wire_stable() {
        assert_eq!(TxType::Sequence.as_str(), "SEQUENCE");
        assert_eq!(TxStatus::ExecKo.as_str(), "EXEC_KO");
    }

    #[test]
    fn test_truthiness_edges() {
        assert!(is_truthy(&json!([])));
        assert!(is_truthy(&json!({})));
        assert!(is_truthy(&json!(-1)));
        assert!(!is_truthy(&json!(0.0)));
    }
}
