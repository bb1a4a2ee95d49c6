use std::sync::Arc;
use std::time::Duration;

use catalogbot_db::repositories::{ConversationStore, InboundLog};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub const INBOUND_LOG_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub conversations: u64,
    pub inbound_ids: u64,
}

/// One pass over expired conversations and old inbound ids. Failures are
/// logged and counted as zero so the next pass can try again.
pub async fn sweep(conversations: &dyn ConversationStore, inbound_log: &dyn InboundLog) -> SweepReport {
    let conversations = conversations.purge_expired().await.unwrap_or_else(|error| {
        warn!(event_name = "maintenance.conversation_purge_failed", error = %error, "conversation purge failed");
        0
    });
    let inbound_ids = inbound_log.purge_older_than(INBOUND_LOG_RETENTION).await.unwrap_or_else(|error| {
        warn!(event_name = "maintenance.inbound_purge_failed", error = %error, "inbound log purge failed");
        0
    });

    debug!(event_name = "maintenance.sweep", conversations, inbound_ids, "maintenance sweep finished");
    SweepReport { conversations, inbound_ids }
}

pub fn spawn(conversations: Arc<dyn ConversationStore>, inbound_log: Arc<dyn InboundLog>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            sweep(conversations.as_ref(), inbound_log.as_ref()).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use catalogbot_core::domain::conversation::ConversationState;
    use chrono::Utc;
    use catalogbot_db::repositories::{ConversationStore, InMemoryConversationStore, InMemoryInboundLog, InboundLog};

    use super::{sweep, SweepReport};

    #[tokio::test]
    async fn sweep_drops_expired_conversations_only() {
        let conversations = InMemoryConversationStore::default();
        let inbound_log = InMemoryInboundLog::default();
        conversations
            .put("2348000000001", &ConversationState::new("2348000000001", Utc::now()), Duration::ZERO)
            .await
            .expect("put expired");
        conversations
            .put("2348000000002", &ConversationState::new("2348000000002", Utc::now()), Duration::from_secs(3600))
            .await
            .expect("put live");
        inbound_log.record_if_new("wamid.recent").await.expect("record");

        let report = sweep(&conversations, &inbound_log).await;

        assert_eq!(report, SweepReport { conversations: 1, inbound_ids: 0 });
        assert!(conversations.get("2348000000002").await.expect("get").is_some());
        assert!(!inbound_log.record_if_new("wamid.recent").await.expect("record again"));
    }
}
