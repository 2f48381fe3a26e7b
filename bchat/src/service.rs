//! Message relay orchestration: ban gate, history replay, provider
//! failover, and transactional persistence of the finished exchange.

use std::collections::HashMap;
use std::sync::Arc;

use bcommon::UserId;
use bprovider::{CompletionRequest, Message, ProviderPool, Role};
use bstore::UserStore;
use tokio::sync::Mutex as AsyncMutex;

use crate::{ChatConfig, ChatError, ChatReply};

pub struct ChatService {
    pool: Arc<ProviderPool>,
    store: Arc<dyn UserStore>,
    config: ChatConfig,
    // One lazily created lock per user so a user's messages are relayed
    // in order even when the transport delivers them concurrently.
    user_locks: std::sync::Mutex<HashMap<UserId, Arc<AsyncMutex<()>>>>,
}

impl ChatService {
    pub fn new(pool: Arc<ProviderPool>, store: Arc<dyn UserStore>, config: ChatConfig) -> Self {
        Self {
            pool,
            store,
            config,
            user_locks: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Relay one user message through the provider pool.
    ///
    /// Successful exchanges are persisted before the reply is returned,
    /// so a reply the caller sees is always already on disk. Failed or
    /// restricted messages leave the store untouched apart from the
    /// profile upsert the caller performed earlier.
    pub async fn process_message(
        &self,
        user_id: UserId,
        text: &str,
    ) -> Result<ChatReply, ChatError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::invalid_request("message text must not be empty"));
        }

        let lock = self.user_lock(user_id)?;
        let _serialized = lock.lock().await;

        if self.store.is_banned(user_id).await? {
            return Ok(ChatReply::AccessRestricted);
        }

        let history = self
            .store
            .recent_history(user_id, self.config.history_limit)
            .await?;

        let mut messages = Vec::with_capacity(history.len() + 2);
        if let Some(system_prompt) = &self.config.system_prompt {
            messages.push(Message::new(Role::System, system_prompt.clone()));
        }
        messages.extend(history);
        messages.push(Message::new(Role::User, text));

        let request = CompletionRequest::new(messages);
        match self.pool.complete(request).await {
            Ok(completion) => {
                self.store
                    .record_exchange(
                        user_id,
                        text.to_string(),
                        completion.text.clone(),
                        completion.usage.total_tokens,
                    )
                    .await?;
                Ok(ChatReply::Assistant {
                    text: completion.text,
                    usage: completion.usage,
                })
            }
            Err(_) => Ok(ChatReply::ProvidersUnavailable),
        }
    }

    fn user_lock(&self, user_id: UserId) -> Result<Arc<AsyncMutex<()>>, ChatError> {
        let mut locks = self
            .user_locks
            .lock()
            .map_err(|_| ChatError::store("user lock table poisoned"))?;
        Ok(Arc::clone(
            locks.entry(user_id).or_insert_with(Default::default),
        ))
    }
}
