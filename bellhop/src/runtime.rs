//! Runtime wiring: configuration in, a fully connected relay out.

use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use bchat::{ChatConfig, ChatService};
use bcommon::UserId;
use bobserve::{SafePoolHooks, TracingPoolHooks};
use bprovider::adapters::OpenAiCompatProvider;
use bprovider::{ChatProvider, FailoverPolicy, ProviderPool, SecretString};
use bstore::{StoreConfig, StoreError, UserStore, create_user_store};

use crate::commands::CommandRouter;

/// One statically configured pool entry. Any backend speaking the
/// OpenAI-compatible chat completion shape qualifies.
#[derive(Debug)]
pub struct ProviderEndpoint {
    pub label: String,
    pub base_url: String,
    pub model: String,
    pub api_key: Option<SecretString>,
}

impl ProviderEndpoint {
    pub fn new(
        label: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            base_url: base_url.into(),
            model: model.into(),
            api_key: None,
        }
    }

    pub fn openai(model: impl Into<String>, api_key: SecretString) -> Self {
        let model = model.into();
        Self::new(
            format!("openai:{model}"),
            bprovider::adapters::OPENAI_BASE_URL,
            model,
        )
        .with_api_key(api_key)
    }

    pub fn ollama(model: impl Into<String>) -> Self {
        let model = model.into();
        Self::new(
            format!("ollama:{model}"),
            bprovider::adapters::OLLAMA_BASE_URL,
            model,
        )
    }

    pub fn with_api_key(mut self, api_key: SecretString) -> Self {
        self.api_key = Some(api_key);
        self
    }
}

#[derive(Debug, Default)]
pub struct BotConfig {
    pub store: StoreConfig,
    pub endpoints: Vec<ProviderEndpoint>,
    pub policy: FailoverPolicy,
    pub admins: HashSet<UserId>,
    pub system_prompt: Option<String>,
    pub history_limit: Option<usize>,
}

impl BotConfig {
    pub fn with_store(mut self, store: StoreConfig) -> Self {
        self.store = store;
        self
    }

    pub fn with_endpoint(mut self, endpoint: ProviderEndpoint) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    pub fn with_policy(mut self, policy: FailoverPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_admin(mut self, admin: UserId) -> Self {
        self.admins.insert(admin);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = Some(limit);
        self
    }
}

pub struct BotRuntime {
    pub store: Arc<dyn UserStore>,
    pub pool: Arc<ProviderPool>,
    pub chat: Arc<ChatService>,
    pub router: CommandRouter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeErrorKind {
    Store,
    HttpClient,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    pub message: String,
}

impl RuntimeError {
    pub fn store(message: impl Into<String>) -> Self {
        Self {
            kind: RuntimeErrorKind::Store,
            message: message.into(),
        }
    }

    pub fn http_client(message: impl Into<String>) -> Self {
        Self {
            kind: RuntimeErrorKind::HttpClient,
            message: message.into(),
        }
    }
}

impl Display for RuntimeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind {
            RuntimeErrorKind::Store => "store error",
            RuntimeErrorKind::HttpClient => "http client error",
        };
        write!(f, "{kind}: {}", self.message)
    }
}

impl Error for RuntimeError {}

impl From<StoreError> for RuntimeError {
    fn from(error: StoreError) -> Self {
        Self::store(error.to_string())
    }
}

/// Assemble the full relay: store, provider pool, chat service, and the
/// command router, sharing one HTTP client across all endpoints.
pub fn build_runtime(config: BotConfig) -> Result<BotRuntime, RuntimeError> {
    let client = reqwest::Client::builder()
        .timeout(config.policy.attempt_timeout)
        .build()
        .map_err(|error| RuntimeError::http_client(error.to_string()))?;

    let providers: Vec<Arc<dyn ChatProvider>> = config
        .endpoints
        .into_iter()
        .map(|endpoint| {
            let mut provider = OpenAiCompatProvider::new(
                client.clone(),
                endpoint.label,
                endpoint.base_url,
                endpoint.model,
            );
            if let Some(api_key) = endpoint.api_key {
                provider = provider.with_api_key(api_key);
            }
            Arc::new(provider) as Arc<dyn ChatProvider>
        })
        .collect();

    let pool = Arc::new(
        ProviderPool::builder()
            .providers(providers)
            .policy(config.policy)
            .hooks(Arc::new(SafePoolHooks::new(TracingPoolHooks)))
            .build(),
    );

    let store = create_user_store(config.store)?;

    let mut chat_config = ChatConfig::default();
    if let Some(prompt) = config.system_prompt {
        chat_config = chat_config.with_system_prompt(prompt);
    }
    if let Some(limit) = config.history_limit {
        chat_config = chat_config.with_history_limit(limit);
    }

    let chat = Arc::new(ChatService::new(
        Arc::clone(&pool),
        Arc::clone(&store),
        chat_config,
    ));
    let router = CommandRouter::new(Arc::clone(&chat), Arc::clone(&store), config.admins);

    Ok(BotRuntime {
        store,
        pool,
        chat,
        router,
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bcommon::UserId;
    use bprovider::PoolErrorKind;

    use super::*;

    #[tokio::test]
    async fn build_runtime_wires_an_in_memory_relay() {
        let config = BotConfig::default()
            .with_store(StoreConfig::InMemory)
            .with_endpoint(ProviderEndpoint::ollama("llama3.2"))
            .with_policy(
                FailoverPolicy::default()
                    .with_attempt_timeout(Duration::from_secs(5))
                    .with_rotation_delay(Duration::ZERO),
            )
            .with_admin(UserId::new(1));

        let runtime = build_runtime(config).expect("runtime should build");
        assert_eq!(runtime.pool.len(), 1);
        assert!(
            !runtime
                .store
                .is_banned(UserId::new(2))
                .await
                .expect("ban check")
        );
    }

    #[tokio::test]
    async fn empty_endpoint_list_builds_but_reports_no_providers() {
        let config = BotConfig::default().with_store(StoreConfig::InMemory);
        let runtime = build_runtime(config).expect("runtime should build");

        let request = bprovider::CompletionRequest::new(vec![bprovider::Message::new(
            bprovider::Role::User,
            "hello",
        )]);
        let error = runtime
            .pool
            .complete(request)
            .await
            .expect_err("empty pool must fail");
        assert_eq!(error.kind, PoolErrorKind::NoProviders);
    }
}
