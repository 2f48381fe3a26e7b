//! Production-friendly observability hooks for the provider pool.
//!
//! ```rust
//! use bobserve::{MetricsPoolHooks, SafePoolHooks, TracingPoolHooks};
//!
//! let _hooks = SafePoolHooks::new(TracingPoolHooks);
//! let _metrics = MetricsPoolHooks;
//! ```

mod metrics_hooks;
mod safe_hooks;
mod tracing_hooks;

pub use metrics_hooks::MetricsPoolHooks;
pub use safe_hooks::SafePoolHooks;
pub use tracing_hooks::TracingPoolHooks;

pub mod prelude {
    pub use crate::{MetricsPoolHooks, SafePoolHooks, TracingPoolHooks};
}

#[cfg(test)]
mod tests;
