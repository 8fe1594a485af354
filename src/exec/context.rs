//! # Execution context handed to executables at prepare time.
//!
//! [`ExecContext`] replaces the original global runtime singleton with an
//! explicit handle constructed once at process start and passed by reference
//! to every component that needs it. Stage executables require the runtime
//! handle and fail fast with `InvalidContext` when it is absent; generic
//! executables may run without one.

use std::sync::Arc;

use crate::error::ExecError;
use crate::runtime::RuntimeContext;

/// Contextual information for one transaction run.
///
/// Cheap to clone (the runtime handle is an `Arc`).
#[derive(Clone, Default)]
pub struct ExecContext {
    runtime: Option<Arc<RuntimeContext>>,
}

impl ExecContext {
    /// Creates a context carrying the runtime handle.
    pub fn new(runtime: Arc<RuntimeContext>) -> Self {
        Self { runtime: Some(runtime) }
    }

    /// Creates an empty context (no runtime handle).
    ///
    /// Executables that require the runtime will reject it in `prepare`.
    #[must_use]
    pub fn empty() -> Self {
        Self { runtime: None }
    }

    /// Returns the runtime handle if present.
    pub fn runtime(&self) -> Option<&Arc<RuntimeContext>> {
        self.runtime.as_ref()
    }

    /// Returns the runtime handle, or `InvalidContext` for `name`.
    ///
    /// This is the fail-fast assertion used by stage executables.
    pub fn require_runtime(&self, name: &str) -> Result<Arc<RuntimeContext>, ExecError> {
        self.runtime
            .clone()
            .ok_or_else(|| ExecError::InvalidContext { name: name.to_string() })
    }
}

impl std::fmt::Debug for ExecContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecContext")
            .field("has_runtime", &self.runtime.is_some())
            .finish()
    }
}
