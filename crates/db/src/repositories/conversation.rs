use std::time::Duration;

use chrono::Utc;
use sqlx::Row;

use catalogbot_core::domain::conversation::ConversationState;

use super::{encode_timestamp, expiry_after, ConversationStore, RepositoryError};
use crate::DbPool;

/// Conversation memory in the `conversation_state` table, one JSON document per user.
pub struct SqlConversationStore {
    pool: DbPool,
}

impl SqlConversationStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ConversationStore for SqlConversationStore {
    async fn get(&self, user_id: &str) -> Result<Option<ConversationState>, RepositoryError> {
        let row = sqlx::query(
            "SELECT state_json FROM conversation_state WHERE user_id = ? AND expires_at > ?",
        )
        .bind(user_id)
        .bind(encode_timestamp(Utc::now()))
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let state_json: String =
            row.try_get("state_json").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        serde_json::from_str(&state_json)
            .map(Some)
            .map_err(|error| RepositoryError::Decode(format!("conversation state: {error}")))
    }

    async fn put(
        &self,
        user_id: &str,
        state: &ConversationState,
        ttl: Duration,
    ) -> Result<(), RepositoryError> {
        let state_json = serde_json::to_string(state)
            .map_err(|error| RepositoryError::Decode(format!("conversation state: {error}")))?;
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO conversation_state (user_id, state_json, expires_at, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET
                 state_json = excluded.state_json,
                 expires_at = excluded.expires_at,
                 updated_at = excluded.updated_at",
        )
        .bind(user_id)
        .bind(state_json)
        .bind(encode_timestamp(expiry_after(now, ttl)))
        .bind(encode_timestamp(now))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, user_id: &str) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM conversation_state WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn purge_expired(&self) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM conversation_state WHERE expires_at <= ?")
            .bind(encode_timestamp(Utc::now()))
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;

    use catalogbot_core::domain::conversation::{ChatMessage, ConversationState, PendingAction};

    use super::SqlConversationStore;
    use crate::repositories::ConversationStore;
    use crate::{connect_with_settings, migrations};

    async fn store() -> SqlConversationStore {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlConversationStore::new(pool)
    }

    fn sample_state(user_id: &str) -> ConversationState {
        let mut state = ConversationState::new(user_id, Utc::now());
        state.messages.push(ChatMessage::user("add nike shoes 20000"));
        state.messages.push(ChatMessage::assistant("What category and condition?"));
        state.pending_action = Some(PendingAction {
            action: "create_product".to_string(),
            arguments: serde_json::Map::new(),
            missing_fields: vec!["category".to_string(), "condition".to_string()],
        });
        state
    }

    #[tokio::test]
    async fn put_then_get_round_trips_state() {
        let store = store().await;
        let state = sample_state("2348012345678");

        store.put(&state.user_id, &state, Duration::from_secs(3600)).await.expect("put");
        let loaded = store.get(&state.user_id).await.expect("get");

        assert_eq!(loaded, Some(state));
    }

    #[tokio::test]
    async fn expired_state_reads_as_absent_and_is_purged() {
        let store = store().await;
        let state = sample_state("2348012345678");

        store.put(&state.user_id, &state, Duration::ZERO).await.expect("put");

        assert_eq!(store.get(&state.user_id).await.expect("get"), None);
        assert_eq!(store.purge_expired().await.expect("purge"), 1);
        assert!(!store.delete(&state.user_id).await.expect("delete"));
    }

    #[tokio::test]
    async fn delete_reports_whether_state_existed() {
        let store = store().await;
        let state = sample_state("u-1");
        store.put("u-1", &state, Duration::from_secs(60)).await.expect("put");

        assert!(store.delete("u-1").await.expect("delete"));
        assert_eq!(store.get("u-1").await.expect("get"), None);
    }
}
