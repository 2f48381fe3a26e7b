use std::sync::{Arc, Mutex};

use bprovider::{PoolOperationHooks, ProviderError};

use crate::{MetricsPoolHooks, SafePoolHooks, TracingPoolHooks};

#[test]
fn tracing_hooks_smoke_test_all_callbacks() {
    let hooks = TracingPoolHooks;
    let error = ProviderError::timeout("provider timeout");

    hooks.on_attempt_start("openai:gpt-4o-mini", 1);
    hooks.on_rotation("openai:gpt-4o-mini", 1, &error);
    hooks.on_success("ollama:llama3", 2);
    hooks.on_exhausted(3);
}

#[test]
fn metrics_hooks_smoke_test_all_callbacks() {
    let hooks = MetricsPoolHooks;
    let error = ProviderError::timeout("provider timeout");

    hooks.on_attempt_start("openai:gpt-4o-mini", 1);
    hooks.on_rotation("openai:gpt-4o-mini", 1, &error);
    hooks.on_success("ollama:llama3", 2);
    hooks.on_exhausted(3);
}

#[derive(Default, Clone)]
struct RecordingPoolHooks {
    events: Arc<Mutex<Vec<&'static str>>>,
}

impl PoolOperationHooks for RecordingPoolHooks {
    fn on_attempt_start(&self, _provider: &str, _attempt: u32) {
        self.events
            .lock()
            .expect("events lock")
            .push("attempt_start");
    }

    fn on_rotation(&self, _provider: &str, _attempt: u32, _error: &ProviderError) {
        self.events.lock().expect("events lock").push("rotation");
    }

    fn on_success(&self, _provider: &str, _attempts: u32) {
        self.events.lock().expect("events lock").push("success");
    }

    fn on_exhausted(&self, _attempts: u32) {
        self.events.lock().expect("events lock").push("exhausted");
    }
}

struct PanicPoolHooks;

impl PoolOperationHooks for PanicPoolHooks {
    fn on_attempt_start(&self, _provider: &str, _attempt: u32) {
        panic!("attempt_start panic");
    }

    fn on_rotation(&self, _provider: &str, _attempt: u32, _error: &ProviderError) {
        panic!("rotation panic");
    }

    fn on_success(&self, _provider: &str, _attempts: u32) {
        panic!("success panic");
    }

    fn on_exhausted(&self, _attempts: u32) {
        panic!("exhausted panic");
    }
}

#[test]
fn safe_pool_hooks_delegate_when_inner_succeeds() {
    let inner = RecordingPoolHooks::default();
    let events = Arc::clone(&inner.events);
    let hooks = SafePoolHooks::new(inner);
    let error = ProviderError::timeout("provider timeout");

    hooks.on_attempt_start("openai:gpt-4o-mini", 1);
    hooks.on_rotation("openai:gpt-4o-mini", 1, &error);
    hooks.on_success("openai:gpt-4o-mini", 2);
    hooks.on_exhausted(3);

    assert_eq!(events.lock().expect("events lock").len(), 4);
}

#[test]
fn safe_pool_hooks_swallow_panics() {
    let hooks = SafePoolHooks::new(PanicPoolHooks);
    let error = ProviderError::timeout("provider timeout");

    hooks.on_attempt_start("openai:gpt-4o-mini", 1);
    hooks.on_rotation("openai:gpt-4o-mini", 1, &error);
    hooks.on_success("openai:gpt-4o-mini", 2);
    hooks.on_exhausted(3);
}
