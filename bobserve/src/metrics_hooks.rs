//! Metrics-based observability hooks for provider pool rotation.
//!
//! ```rust
//! use bobserve::MetricsPoolHooks;
//! use bprovider::PoolOperationHooks;
//!
//! fn accepts_pool_hooks(_hooks: &dyn PoolOperationHooks) {}
//!
//! let hooks = MetricsPoolHooks;
//! accepts_pool_hooks(&hooks);
//! ```

use bprovider::{PoolOperationHooks, ProviderError};

#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsPoolHooks;

impl PoolOperationHooks for MetricsPoolHooks {
    fn on_attempt_start(&self, provider: &str, _attempt: u32) {
        metrics::counter!(
            "bellhop_pool_attempt_start_total",
            "provider" => provider.to_string()
        )
        .increment(1);
    }

    fn on_rotation(&self, provider: &str, _attempt: u32, error: &ProviderError) {
        metrics::counter!(
            "bellhop_pool_rotation_total",
            "provider" => provider.to_string(),
            "error_kind" => format!("{:?}", error.kind)
        )
        .increment(1);
    }

    fn on_success(&self, provider: &str, attempts: u32) {
        metrics::counter!(
            "bellhop_pool_success_total",
            "provider" => provider.to_string()
        )
        .increment(1);
        metrics::histogram!(
            "bellhop_pool_attempts_per_success",
            "provider" => provider.to_string()
        )
        .record(attempts as f64);
    }

    fn on_exhausted(&self, attempts: u32) {
        metrics::counter!("bellhop_pool_exhausted_total").increment(1);
        metrics::histogram!("bellhop_pool_attempts_per_exhaustion").record(attempts as f64);
    }
}
