//! Chat configuration and the structured per-message outcome.

use bprovider::TokenUsage;

/// Outcome of relaying one user message. Callers render each variant
/// themselves; the service never encodes outcomes into reply text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatReply {
    /// A qualifying completion was produced and the exchange persisted.
    Assistant { text: String, usage: TokenUsage },
    /// The sender is banned; nothing was forwarded or persisted.
    AccessRestricted,
    /// Every provider was attempted without a qualifying reply.
    ProvidersUnavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    pub system_prompt: Option<String>,
    /// Number of prior turns replayed to the provider, counted in
    /// individual messages, not exchanges.
    pub history_limit: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            system_prompt: None,
            history_limit: 6,
        }
    }
}

impl ChatConfig {
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }
}
