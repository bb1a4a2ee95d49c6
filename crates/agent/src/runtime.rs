use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};

use catalogbot_core::config::AppConfig;
use catalogbot_core::domain::conversation::ConversationState;
use catalogbot_db::repositories::{ConversationStore, SellerRepository};

use crate::conversation::{ConversationEngine, TurnError};

/// One async mutex per user id. Entries nobody holds or waits on are dropped
/// the next time a lock is handed out.
#[derive(Default)]
pub struct TurnLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TurnLocks {
    pub async fn acquire(&self, user_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(user_id.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }

    pub async fn tracked(&self) -> usize {
        self.locks.lock().await.len()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeSettings {
    pub conversation_ttl: Duration,
    pub max_history_messages: usize,
    pub turn_timeout: Duration,
}

impl RuntimeSettings {
    /// The turn deadline covers every model call a turn can make, each with
    /// its retries, plus a small margin for catalog work.
    pub fn from_config(config: &AppConfig) -> Self {
        let model_calls = u64::from(config.agent.max_dispatch_rounds) + 1;
        let attempts = u64::from(config.llm.max_retries) + 1;
        Self {
            conversation_ttl: Duration::from_secs(config.conversation.ttl_secs),
            max_history_messages: config.conversation.max_history_messages,
            turn_timeout: Duration::from_secs(
                config.llm.timeout_secs.saturating_mul(model_calls * attempts) + 10,
            ),
        }
    }
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TurnOutcome {
    pub state: ConversationState,
    pub reply: String,
}

pub struct AgentRuntime {
    engine: ConversationEngine,
    conversations: Arc<dyn ConversationStore>,
    sellers: Arc<dyn SellerRepository>,
    locks: TurnLocks,
    settings: RuntimeSettings,
}

impl AgentRuntime {
    pub fn new(
        engine: ConversationEngine,
        conversations: Arc<dyn ConversationStore>,
        sellers: Arc<dyn SellerRepository>,
        settings: RuntimeSettings,
    ) -> Self {
        Self { engine, conversations, sellers, locks: TurnLocks::default(), settings }
    }

    pub async fn process_turn(
        &self,
        user_id: &str,
        text: &str,
        image_urls: &[String],
    ) -> Result<TurnOutcome, TurnError> {
        self.process_turn_as(user_id, None, text, image_urls).await
    }

    /// Load, run and save one turn while holding the user's lock. Nothing is
    /// written back when the turn fails.
    pub async fn process_turn_as(
        &self,
        user_id: &str,
        display_name: Option<&str>,
        text: &str,
        image_urls: &[String],
    ) -> Result<TurnOutcome, TurnError> {
        let _turn = self.locks.acquire(user_id).await;

        let mut state = match self.conversations.get(user_id).await {
            Ok(Some(state)) => state,
            Ok(None) => {
                info!(event_name = "conversation.started", user_id, "starting new conversation");
                ConversationState::new(user_id, Utc::now())
            }
            Err(error) => {
                warn!(
                    event_name = "conversation.load_failed",
                    user_id,
                    error = %error,
                    "conversation store unavailable, continuing with a fresh conversation"
                );
                ConversationState::new(user_id, Utc::now())
            }
        };
        state.trim_history(self.settings.max_history_messages);

        let seller =
            self.sellers.find_or_create(user_id, display_name).await.map_err(TurnError::Seller)?;
        state.seller_id = Some(seller.id.clone());

        let turn = self.engine.run_turn(&mut state, &seller, text, image_urls);
        let reply = match tokio::time::timeout(self.settings.turn_timeout, turn).await {
            Ok(result) => result?,
            Err(_) => return Err(TurnError::TimedOut(self.settings.turn_timeout)),
        };

        if let Err(error) =
            self.conversations.put(user_id, &state, self.settings.conversation_ttl).await
        {
            warn!(
                event_name = "conversation.save_failed",
                user_id,
                error = %error,
                "conversation state was not saved"
            );
        }

        Ok(TurnOutcome { state, reply })
    }

    pub async fn reset_conversation(&self, user_id: &str) -> bool {
        let _turn = self.locks.acquire(user_id).await;
        match self.conversations.delete(user_id).await {
            Ok(deleted) => deleted,
            Err(error) => {
                warn!(event_name = "conversation.reset_failed", user_id, error = %error, "reset failed");
                false
            }
        }
    }

    pub fn settings(&self) -> &RuntimeSettings {
        &self.settings
    }
}
