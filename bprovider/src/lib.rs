//! Completion providers and the rotating failover pool.

mod credentials;
mod error;
mod pool;
mod provider;
mod types;

pub mod adapters;

pub use credentials::SecretString;
pub use error::{ProviderError, ProviderErrorKind};
pub use pool::{
    FailoverPolicy, NoopPoolHooks, PoolError, PoolErrorKind, PoolOperationHooks, ProviderPool,
    ProviderPoolBuilder,
};
pub use provider::{ChatProvider, ProviderFuture};
pub use types::{Completion, CompletionRequest, Message, Role, TokenUsage};
