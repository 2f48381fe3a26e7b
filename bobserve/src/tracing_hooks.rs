//! Tracing-based observability hooks for provider pool rotation.
//!
//! ```rust
//! use bobserve::TracingPoolHooks;
//! use bprovider::PoolOperationHooks;
//!
//! fn accepts_pool_hooks(_hooks: &dyn PoolOperationHooks) {}
//!
//! let hooks = TracingPoolHooks;
//! accepts_pool_hooks(&hooks);
//! ```

use bprovider::{PoolOperationHooks, ProviderError};

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingPoolHooks;

impl PoolOperationHooks for TracingPoolHooks {
    fn on_attempt_start(&self, provider: &str, attempt: u32) {
        tracing::info!(
            phase = "pool",
            event = "attempt_start",
            provider,
            attempt
        );
    }

    fn on_rotation(&self, provider: &str, attempt: u32, error: &ProviderError) {
        tracing::warn!(
            phase = "pool",
            event = "rotation",
            provider,
            attempt,
            error_kind = ?error.kind,
            retryable = error.retryable,
            error = %error
        );
    }

    fn on_success(&self, provider: &str, attempts: u32) {
        tracing::info!(
            phase = "pool",
            event = "success",
            provider,
            attempts
        );
    }

    fn on_exhausted(&self, attempts: u32) {
        tracing::error!(phase = "pool", event = "exhausted", attempts);
    }
}
