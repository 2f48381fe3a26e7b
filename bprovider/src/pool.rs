//! Rotating failover pool over an ordered list of interchangeable providers.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::{ChatProvider, Completion, CompletionRequest, ProviderError};

/// Per-attempt timeout, fixed rotation delay, and the reply quality
/// threshold. The threshold is configurable because trimmed-length is a
/// heuristic that can misclassify legitimately short answers.
#[derive(Debug, Clone, PartialEq)]
pub struct FailoverPolicy {
    pub attempt_timeout: Duration,
    pub rotation_delay: Duration,
    pub min_reply_chars: usize,
}

impl Default for FailoverPolicy {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_secs(60),
            rotation_delay: Duration::from_secs(1),
            min_reply_chars: 5,
        }
    }
}

impl FailoverPolicy {
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn with_rotation_delay(mut self, delay: Duration) -> Self {
        self.rotation_delay = delay;
        self
    }

    pub fn with_min_reply_chars(mut self, chars: usize) -> Self {
        self.min_reply_chars = chars;
        self
    }
}

pub trait PoolOperationHooks: Send + Sync {
    fn on_attempt_start(&self, _provider: &str, _attempt: u32) {}

    fn on_rotation(&self, _provider: &str, _attempt: u32, _error: &ProviderError) {}

    fn on_success(&self, _provider: &str, _attempts: u32) {}

    fn on_exhausted(&self, _attempts: u32) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPoolHooks;

impl PoolOperationHooks for NoopPoolHooks {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolErrorKind {
    /// Every provider was attempted once without a qualifying reply.
    Exhausted,
    /// The pool was built with an empty provider list.
    NoProviders,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolError {
    pub kind: PoolErrorKind,
    pub attempts: u32,
}

impl PoolError {
    pub fn exhausted(attempts: u32) -> Self {
        Self {
            kind: PoolErrorKind::Exhausted,
            attempts,
        }
    }

    pub fn no_providers() -> Self {
        Self {
            kind: PoolErrorKind::NoProviders,
            attempts: 0,
        }
    }
}

impl Display for PoolError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            PoolErrorKind::Exhausted => {
                write!(f, "all providers unavailable after {} attempts", self.attempts)
            }
            PoolErrorKind::NoProviders => f.write_str("provider pool is empty"),
        }
    }
}

impl Error for PoolError {}

/// Ordered provider list with a process-wide rotation cursor.
///
/// The cursor marks the provider the next call tries first. It advances
/// only past failing providers, so a healthy provider keeps serving
/// consecutive calls while failing ones are skipped round-robin. Cursor
/// updates are relaxed atomics: concurrent calls may skew fairness but
/// every attempt still addresses a valid provider.
pub struct ProviderPool {
    providers: Vec<Arc<dyn ChatProvider>>,
    cursor: AtomicUsize,
    policy: FailoverPolicy,
    hooks: Arc<dyn PoolOperationHooks>,
}

impl ProviderPool {
    pub fn builder() -> ProviderPoolBuilder {
        ProviderPoolBuilder::default()
    }

    pub fn new(providers: Vec<Arc<dyn ChatProvider>>) -> Self {
        Self::builder().providers(providers).build()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn policy(&self) -> &FailoverPolicy {
        &self.policy
    }

    /// Obtain one completion, masking individual provider flakiness.
    ///
    /// Tries at most one attempt per provider, starting at the rotation
    /// cursor. A reply qualifies when its trimmed length exceeds
    /// `min_reply_chars`; qualifying text is returned trimmed and the
    /// cursor stays on the provider that produced it. Timeouts, transport
    /// failures, and short replies all rotate the cursor and wait the
    /// fixed rotation delay before the next attempt.
    pub async fn complete(&self, request: CompletionRequest) -> Result<Completion, PoolError> {
        let count = self.providers.len();
        if count == 0 {
            self.hooks.on_exhausted(0);
            return Err(PoolError::no_providers());
        }

        for attempt in 1..=count as u32 {
            let index = self.cursor.load(Ordering::Relaxed) % count;
            let provider = &self.providers[index];
            self.hooks.on_attempt_start(provider.label(), attempt);

            match self.attempt(provider.as_ref(), request.clone()).await {
                Ok(completion) => {
                    self.hooks.on_success(provider.label(), attempt);
                    return Ok(completion);
                }
                Err(error) => {
                    self.hooks.on_rotation(provider.label(), attempt, &error);
                    self.cursor.store((index + 1) % count, Ordering::Relaxed);
                    if attempt < count as u32 && !self.policy.rotation_delay.is_zero() {
                        tokio::time::sleep(self.policy.rotation_delay).await;
                    }
                }
            }
        }

        self.hooks.on_exhausted(count as u32);
        Err(PoolError::exhausted(count as u32))
    }

    async fn attempt(
        &self,
        provider: &dyn ChatProvider,
        request: CompletionRequest,
    ) -> Result<Completion, ProviderError> {
        let response = tokio::time::timeout(self.policy.attempt_timeout, provider.complete(request))
            .await
            .map_err(|_| {
                ProviderError::timeout(format!(
                    "provider '{}' exceeded the {}s attempt timeout",
                    provider.label(),
                    self.policy.attempt_timeout.as_secs()
                ))
            })??;

        let trimmed = response.text.trim();
        if trimmed.len() <= self.policy.min_reply_chars {
            return Err(ProviderError::short_completion(format!(
                "provider '{}' returned {} trimmed characters (minimum {})",
                provider.label(),
                trimmed.len(),
                self.policy.min_reply_chars
            )));
        }

        Ok(Completion {
            provider: response.provider,
            text: trimmed.to_string(),
            usage: response.usage,
        })
    }
}

#[derive(Default)]
pub struct ProviderPoolBuilder {
    providers: Vec<Arc<dyn ChatProvider>>,
    policy: Option<FailoverPolicy>,
    hooks: Option<Arc<dyn PoolOperationHooks>>,
}

impl ProviderPoolBuilder {
    pub fn providers(mut self, providers: Vec<Arc<dyn ChatProvider>>) -> Self {
        self.providers = providers;
        self
    }

    pub fn provider<P>(mut self, provider: P) -> Self
    where
        P: ChatProvider + 'static,
    {
        self.providers.push(Arc::new(provider));
        self
    }

    pub fn policy(mut self, policy: FailoverPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn hooks(mut self, hooks: Arc<dyn PoolOperationHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub fn build(self) -> ProviderPool {
        ProviderPool {
            providers: self.providers,
            cursor: AtomicUsize::new(0),
            policy: self.policy.unwrap_or_default(),
            hooks: self.hooks.unwrap_or_else(|| Arc::new(NoopPoolHooks)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::AtomicU32;

    use super::*;
    use crate::{Message, ProviderFuture, Role, TokenUsage};

    struct ScriptedProvider {
        label: String,
        reply: Result<String, ProviderError>,
        calls: AtomicU32,
    }

    impl ScriptedProvider {
        fn healthy(label: &str, reply: &str) -> Self {
            Self {
                label: label.to_string(),
                reply: Ok(reply.to_string()),
                calls: AtomicU32::new(0),
            }
        }

        fn failing(label: &str) -> Self {
            Self {
                label: label.to_string(),
                reply: Err(ProviderError::transport("connection refused")),
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ChatProvider for ScriptedProvider {
        fn label(&self) -> &str {
            &self.label
        }

        fn complete<'a>(
            &'a self,
            request: CompletionRequest,
        ) -> ProviderFuture<'a, Result<Completion, ProviderError>> {
            Box::pin(async move {
                request.validate()?;
                self.calls.fetch_add(1, Ordering::SeqCst);
                match &self.reply {
                    Ok(text) => Ok(Completion {
                        provider: self.label.clone(),
                        text: text.clone(),
                        usage: TokenUsage::default(),
                    }),
                    Err(error) => Err(error.clone()),
                }
            })
        }
    }

    fn test_policy() -> FailoverPolicy {
        FailoverPolicy::default()
            .with_attempt_timeout(Duration::from_secs(5))
            .with_rotation_delay(Duration::ZERO)
    }

    fn request() -> CompletionRequest {
        CompletionRequest::new(vec![Message::new(Role::User, "hello")])
    }

    #[derive(Default)]
    struct RecordingHooks {
        events: Mutex<Vec<String>>,
    }

    impl PoolOperationHooks for RecordingHooks {
        fn on_attempt_start(&self, provider: &str, attempt: u32) {
            self.events
                .lock()
                .expect("events lock")
                .push(format!("start:{provider}:{attempt}"));
        }

        fn on_rotation(&self, provider: &str, attempt: u32, error: &ProviderError) {
            self.events
                .lock()
                .expect("events lock")
                .push(format!("rotate:{provider}:{attempt}:{:?}", error.kind));
        }

        fn on_success(&self, provider: &str, attempts: u32) {
            self.events
                .lock()
                .expect("events lock")
                .push(format!("success:{provider}:{attempts}"));
        }

        fn on_exhausted(&self, attempts: u32) {
            self.events
                .lock()
                .expect("events lock")
                .push(format!("exhausted:{attempts}"));
        }
    }

    #[tokio::test]
    async fn failover_reaches_the_last_healthy_provider() {
        let first = Arc::new(ScriptedProvider::failing("first"));
        let second = Arc::new(ScriptedProvider::failing("second"));
        let third = Arc::new(ScriptedProvider::healthy("third", "ten chars!"));

        let pool = ProviderPool::builder()
            .providers(vec![
                Arc::clone(&first) as Arc<dyn ChatProvider>,
                Arc::clone(&second) as Arc<dyn ChatProvider>,
                Arc::clone(&third) as Arc<dyn ChatProvider>,
            ])
            .policy(test_policy())
            .build();

        let completion = pool.complete(request()).await.expect("pool should succeed");
        assert_eq!(completion.text, "ten chars!");
        assert_eq!(first.calls(), 1);
        assert_eq!(second.calls(), 1);
        assert_eq!(third.calls(), 1);
    }

    #[tokio::test]
    async fn exhaustion_attempts_each_provider_exactly_once() {
        let providers: Vec<Arc<ScriptedProvider>> = (0..3)
            .map(|n| Arc::new(ScriptedProvider::failing(&format!("p{n}"))))
            .collect();

        let hooks = Arc::new(RecordingHooks::default());
        let pool = ProviderPool::builder()
            .providers(
                providers
                    .iter()
                    .map(|p| Arc::clone(p) as Arc<dyn ChatProvider>)
                    .collect(),
            )
            .policy(test_policy())
            .hooks(Arc::clone(&hooks) as Arc<dyn PoolOperationHooks>)
            .build();

        let error = pool.complete(request()).await.expect_err("pool should fail");
        assert_eq!(error.kind, PoolErrorKind::Exhausted);
        assert_eq!(error.attempts, 3);
        for provider in &providers {
            assert_eq!(provider.calls(), 1);
        }

        let events = hooks.events.lock().expect("events lock");
        assert!(events.contains(&"exhausted:3".to_string()));
    }

    #[tokio::test]
    async fn short_replies_rotate_like_failures() {
        let terse = Arc::new(ScriptedProvider::healthy("terse", "ok"));
        let verbose = Arc::new(ScriptedProvider::healthy("verbose", "  a real answer  "));

        let hooks = Arc::new(RecordingHooks::default());
        let pool = ProviderPool::builder()
            .providers(vec![
                Arc::clone(&terse) as Arc<dyn ChatProvider>,
                Arc::clone(&verbose) as Arc<dyn ChatProvider>,
            ])
            .policy(test_policy())
            .hooks(Arc::clone(&hooks) as Arc<dyn PoolOperationHooks>)
            .build();

        let completion = pool.complete(request()).await.expect("pool should succeed");
        assert_eq!(completion.text, "a real answer");

        let events = hooks.events.lock().expect("events lock");
        assert!(
            events
                .iter()
                .any(|event| event == "rotate:terse:1:ShortCompletion")
        );
        assert!(events.contains(&"success:verbose:2".to_string()));
    }

    #[tokio::test]
    async fn cursor_resumes_at_the_last_successful_provider() {
        let flaky = Arc::new(ScriptedProvider::failing("flaky"));
        let steady = Arc::new(ScriptedProvider::healthy("steady", "steady answer"));

        let pool = ProviderPool::builder()
            .providers(vec![
                Arc::clone(&flaky) as Arc<dyn ChatProvider>,
                Arc::clone(&steady) as Arc<dyn ChatProvider>,
            ])
            .policy(test_policy())
            .build();

        pool.complete(request()).await.expect("first call");
        pool.complete(request()).await.expect("second call");

        // The failing provider is only consulted on the first call; the
        // cursor stays parked on the provider that answered.
        assert_eq!(flaky.calls(), 1);
        assert_eq!(steady.calls(), 2);
    }

    #[tokio::test]
    async fn empty_pool_reports_no_providers() {
        let pool = ProviderPool::builder().policy(test_policy()).build();
        let error = pool.complete(request()).await.expect_err("must fail");
        assert_eq!(error.kind, PoolErrorKind::NoProviders);
    }

    #[tokio::test]
    async fn slow_provider_times_out_and_rotates() {
        struct StalledProvider;

        impl ChatProvider for StalledProvider {
            fn label(&self) -> &str {
                "stalled"
            }

            fn complete<'a>(
                &'a self,
                _request: CompletionRequest,
            ) -> ProviderFuture<'a, Result<Completion, ProviderError>> {
                Box::pin(async move {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(ProviderError::other("unreachable"))
                })
            }
        }

        let fallback = Arc::new(ScriptedProvider::healthy("fallback", "prompt answer"));
        let hooks = Arc::new(RecordingHooks::default());
        let pool = ProviderPool::builder()
            .providers(vec![
                Arc::new(StalledProvider) as Arc<dyn ChatProvider>,
                Arc::clone(&fallback) as Arc<dyn ChatProvider>,
            ])
            .policy(test_policy().with_attempt_timeout(Duration::from_millis(50)))
            .hooks(Arc::clone(&hooks) as Arc<dyn PoolOperationHooks>)
            .build();

        let completion = pool.complete(request()).await.expect("pool should succeed");
        assert_eq!(completion.text, "prompt answer");

        let events = hooks.events.lock().expect("events lock");
        assert!(
            events
                .iter()
                .any(|event| event == "rotate:stalled:1:Timeout")
        );
    }
}
