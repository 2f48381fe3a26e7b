use std::panic::{AssertUnwindSafe, catch_unwind};

use bprovider::{PoolOperationHooks, ProviderError};

pub struct SafePoolHooks<H> {
    inner: H,
}

impl<H> SafePoolHooks<H> {
    pub fn new(inner: H) -> Self {
        Self { inner }
    }
}

impl<H> PoolOperationHooks for SafePoolHooks<H>
where
    H: PoolOperationHooks,
{
    fn on_attempt_start(&self, provider: &str, attempt: u32) {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            self.inner.on_attempt_start(provider, attempt)
        }));
    }

    fn on_rotation(&self, provider: &str, attempt: u32, error: &ProviderError) {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            self.inner.on_rotation(provider, attempt, error)
        }));
    }

    fn on_success(&self, provider: &str, attempts: u32) {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            self.inner.on_success(provider, attempts)
        }));
    }

    fn on_exhausted(&self, attempts: u32) {
        let _ = catch_unwind(AssertUnwindSafe(|| self.inner.on_exhausted(attempts)));
    }
}
