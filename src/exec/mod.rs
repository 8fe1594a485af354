//! # Executable units of work.
//!
//! This module defines the [`Executable`] trait (async unit of work with a
//! prepare/execute/commit/rollback/finish lifecycle), the [`ExecContext`]
//! passed to `prepare`, and a convenient function-backed implementation
//! [`ExecFn`].
//!
//! Executables are owned exclusively by the [`Transaction`](crate::Transaction)
//! that runs them; the common handle type is [`ExecutableRef`], a boxed
//! trait object.

mod context;
mod exec_fn;
mod executable;

pub use context::ExecContext;
pub use exec_fn::{unimplemented_exec, ExecFn};
pub use executable::{ExecStatus, Executable, ExecutableRef};
