//! Provider trait implemented by every interchangeable completion backend.

use bcommon::BoxFuture;

use crate::{Completion, CompletionRequest, ProviderError};

pub type ProviderFuture<'a, T> = BoxFuture<'a, T>;

/// An interchangeable backend capable of producing a single non-streaming
/// text completion for a role/content message sequence.
pub trait ChatProvider: Send + Sync {
    /// Stable instance label used in logs and metrics, e.g. `openai:gpt-4o-mini`.
    fn label(&self) -> &str;

    fn complete<'a>(
        &'a self,
        request: CompletionRequest,
    ) -> ProviderFuture<'a, Result<Completion, ProviderError>>;
}
