//! # Function-backed executable (`ExecFn`)
//!
//! [`ExecFn`] wraps a closure `F: Fn(ExecContext, Option<Value>) -> Fut`,
//! producing a fresh future per execution. Useful for ad-hoc stages and
//! tests; real boot stages are dedicated types.
//!
//! ## Example
//! ```
//! use serde_json::{json, Value};
//! use txvisor::{ExecContext, ExecError, ExecFn};
//!
//! let step = ExecFn::boxed("worker", |_ctx, _data| async move {
//!     Ok::<Value, ExecError>(json!(true))
//! });
//! assert_eq!(step.name(), "worker");
//! ```

use std::borrow::Cow;
use std::future::Future;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ExecError;

use super::{ExecContext, ExecStatus, Executable, ExecutableRef};

/// Function-backed executable implementation.
///
/// Wraps a closure that *creates* a new future per execution; the closure
/// receives the prepared [`ExecContext`] and the transaction's data payload.
pub struct ExecFn<F> {
    name: Cow<'static, str>,
    f: F,
    ctx: Option<ExecContext>,
    status: ExecStatus,
    needs_runtime: bool,
}

impl<F> ExecFn<F> {
    /// Creates a new function-backed executable.
    ///
    /// Prefer [`ExecFn::boxed`] when you immediately need an
    /// [`ExecutableRef`].
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
            ctx: None,
            status: ExecStatus::new(),
            needs_runtime: false,
        }
    }

    /// Makes `prepare` fail with `InvalidContext` unless the context carries
    /// a runtime handle (the stage-executable contract).
    #[must_use]
    pub fn require_runtime(mut self) -> Self {
        self.needs_runtime = true;
        self
    }
}

impl<F, Fut> ExecFn<F>
where
    F: Fn(ExecContext, Option<Value>) -> Fut + Send + 'static,
    Fut: Future<Output = Result<Value, ExecError>> + Send + 'static,
{
    /// Creates the executable and returns it boxed (`Box<dyn Executable>`).
    pub fn boxed(name: impl Into<Cow<'static, str>>, f: F) -> ExecutableRef {
        Box::new(Self::new(name, f))
    }
}

/// Creates an executable whose `execute` always fails with
/// [`ExecError::NotImplemented`] — the documented base behavior of an
/// executable without an override.
pub fn unimplemented_exec(name: impl Into<Cow<'static, str>>) -> ExecutableRef {
    let name = name.into();
    let fail_name = name.to_string();
    ExecFn::boxed(name, move |_ctx, _data| {
        let name = fail_name.clone();
        async move { Err(ExecError::NotImplemented { name }) }
    })
}

#[async_trait]
impl<F, Fut> Executable for ExecFn<F>
where
    F: Fn(ExecContext, Option<Value>) -> Fut + Send + 'static,
    Fut: Future<Output = Result<Value, ExecError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn prepare(&mut self, ctx: &ExecContext) -> Result<(), ExecError> {
        if self.needs_runtime {
            ctx.require_runtime(&self.name)?;
        }
        self.ctx = Some(ctx.clone());
        self.status.clear();
        Ok(())
    }

    async fn execute(&mut self, data: Option<&Value>) -> Result<Value, ExecError> {
        let ctx = self.ctx.clone().unwrap_or_default();
        match (self.f)(ctx, data.cloned()).await {
            Ok(value) => Ok(value),
            Err(err) => {
                self.status.set_error(err.to_string());
                Err(err)
            }
        }
    }

    fn status(&self) -> &ExecStatus {
        &self.status
    }

    fn status_mut(&mut self) -> &mut ExecStatus {
        &mut self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_exec_fn_records_error_state() {
        let mut step = ExecFn::new("failing", |_ctx, _data| async {
            Err(ExecError::failed("disk on fire"))
        });
        step.prepare(&ExecContext::empty()).expect("prepare");
        let out = step.execute(None).await;
        assert!(out.is_err());
        assert!(step.has_error());
        assert!(step.error_msg().unwrap().contains("disk on fire"));
    }

    #[tokio::test]
    async fn test_prepare_resets_error_state() {
        let mut step = ExecFn::new("flaky", |_ctx, _data| async {
            Err(ExecError::failed("once"))
        });
        step.prepare(&ExecContext::empty()).expect("prepare");
        let _ = step.execute(None).await;
        assert!(step.has_error());
        step.prepare(&ExecContext::empty()).expect("prepare again");
        assert!(!step.has_error());
    }

    #[tokio::test]
    async fn test_require_runtime_rejects_empty_context() {
        let mut step = ExecFn::new("stage-like", |_ctx, _data| async {
            Ok(Value::Bool(true))
        })
        .require_runtime();
        let err = step.prepare(&ExecContext::empty()).unwrap_err();
        assert_eq!(err.as_label(), "exec_invalid_context");
    }

    #[tokio::test]
    async fn test_unimplemented_exec_fails_not_implemented() {
        let mut step = unimplemented_exec("base");
        step.prepare(&ExecContext::empty()).expect("prepare");
        let err = step.execute(None).await.unwrap_err();
        assert_eq!(err.as_label(), "exec_not_implemented");
    }
}
