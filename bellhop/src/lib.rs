//! Unified facade over the bellhop workspace crates.
//!
//! This crate is designed to be the single dependency for transport
//! bindings. It re-exports the core bellhop crates and provides the
//! command surface and runtime wiring a bot front-end needs.
//!
//! ```rust
//! use bellhop::{BotConfig, ProviderEndpoint, StoreConfig, build_runtime};
//!
//! let config = BotConfig::default()
//!     .with_store(StoreConfig::InMemory)
//!     .with_endpoint(ProviderEndpoint::ollama("llama3.2"));
//! let runtime = build_runtime(config).expect("runtime should build");
//! assert_eq!(runtime.pool.len(), 1);
//! ```

pub mod commands;
pub mod runtime;

pub use bchat;
pub use bcommon;
pub use bobserve;
pub use bprovider;
pub use bstore;

pub use bchat::{ChatConfig, ChatError, ChatErrorKind, ChatReply, ChatService};
pub use bcommon::{BoxFuture, UserId};
pub use bobserve::{MetricsPoolHooks, SafePoolHooks, TracingPoolHooks};
pub use bprovider::adapters::{OLLAMA_BASE_URL, OPENAI_BASE_URL, OpenAiCompatProvider};
pub use bprovider::{
    ChatProvider, Completion, CompletionRequest, FailoverPolicy, Message, NoopPoolHooks,
    PoolError, PoolErrorKind, PoolOperationHooks, ProviderError, ProviderErrorKind, ProviderFuture,
    ProviderPool, ProviderPoolBuilder, Role, SecretString, TokenUsage,
};
pub use bstore::{
    BanCache, BanRecord, InMemoryUserStore, SqliteUserStore, StoreConfig, StoreError,
    StoreErrorKind, UserProfile, UserRecord, UserStats, UserStore, create_user_store,
};

pub use commands::{Command, CommandParseError, CommandRouter, UserIdentity};
pub use runtime::{
    BotConfig, BotRuntime, ProviderEndpoint, RuntimeError, RuntimeErrorKind, build_runtime,
};
