use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};

use catalogbot_agent::{AgentRuntime, TurnError, FALLBACK_REPLY};
use catalogbot_core::errors::ApplicationError;
use catalogbot_db::repositories::InboundLog;

use crate::client::MessageSender;
use crate::media::MediaRelay;
use crate::payload::{InboundContent, InboundMessage};
use crate::reply::{truncate_reply, IMAGE_FAILURE_NOTE, UNSUPPORTED_MESSAGE_REPLY};

/// The conversation side of the bot as the transport sees it.
#[async_trait]
pub trait ConversationHandler: Send + Sync {
    async fn handle(
        &self,
        user_id: &str,
        display_name: Option<&str>,
        text: &str,
        image_urls: &[String],
    ) -> Result<String, TurnError>;
}

#[async_trait]
impl ConversationHandler for AgentRuntime {
    async fn handle(
        &self,
        user_id: &str,
        display_name: Option<&str>,
        text: &str,
        image_urls: &[String],
    ) -> Result<String, TurnError> {
        Ok(self.process_turn_as(user_id, display_name, text, image_urls).await?.reply)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    Replied,
    Duplicate,
    Unsupported,
    /// The turn failed and the seller got the generic apology.
    Failed,
}

pub struct InboundProcessor {
    handler: Arc<dyn ConversationHandler>,
    sender: Arc<dyn MessageSender>,
    media: Option<Arc<MediaRelay>>,
    inbound_log: Arc<dyn InboundLog>,
}

impl InboundProcessor {
    pub fn new(
        handler: Arc<dyn ConversationHandler>,
        sender: Arc<dyn MessageSender>,
        media: Option<Arc<MediaRelay>>,
        inbound_log: Arc<dyn InboundLog>,
    ) -> Self {
        Self { handler, sender, media, inbound_log }
    }

    /// Never fails: each fault is logged and turned into a reply or a skip.
    pub async fn process_message(&self, message: InboundMessage) -> Disposition {
        let correlation_id = message.message_id.as_str();
        let user_id = message.from.as_str();

        if !message.message_id.is_empty() {
            match self.inbound_log.record_if_new(&message.message_id).await {
                Ok(true) => {}
                Ok(false) => {
                    info!(event_name = "whatsapp.duplicate", correlation_id, user_id, "redelivery ignored");
                    return Disposition::Duplicate;
                }
                Err(error) => warn!(
                    event_name = "whatsapp.dedupe_unavailable",
                    correlation_id,
                    error = %error,
                    "processing without de-duplication"
                ),
            }
        }

        let (text, image_urls) = match message.content {
            InboundContent::Text(body) => (body, Vec::new()),
            InboundContent::Image { media_id, caption, .. } => {
                self.prepare_image(correlation_id, &media_id, caption.unwrap_or_default()).await
            }
            InboundContent::Unsupported { kind } => {
                info!(event_name = "whatsapp.unsupported", correlation_id, user_id, kind = %kind, "unsupported message type");
                self.send(user_id, correlation_id, UNSUPPORTED_MESSAGE_REPLY).await;
                return Disposition::Unsupported;
            }
        };

        let (reply, disposition) = match self
            .handler
            .handle(user_id, message.profile_name.as_deref(), &text, &image_urls)
            .await
        {
            Ok(reply) if reply.trim().is_empty() => (FALLBACK_REPLY.to_string(), Disposition::Replied),
            Ok(reply) => (reply, Disposition::Replied),
            Err(turn_error) => {
                let failure = ApplicationError::from(&turn_error).into_interface(correlation_id);
                error!(
                    event_name = "whatsapp.turn_failed",
                    correlation_id,
                    user_id,
                    error = %turn_error,
                    classified = %failure,
                    "conversation turn failed"
                );
                (failure.user_message().to_string(), Disposition::Failed)
            }
        };

        self.send(user_id, correlation_id, &truncate_reply(&reply)).await;
        disposition
    }

    async fn prepare_image(
        &self,
        correlation_id: &str,
        media_id: &str,
        mut text: String,
    ) -> (String, Vec<String>) {
        let relayed = match &self.media {
            Some(relay) => relay.relay(media_id).await.map_err(|error| error.to_string()),
            None => Err("no media relay configured".to_string()),
        };

        match relayed {
            Ok(url) => (text, vec![url]),
            Err(reason) => {
                warn!(
                    event_name = "whatsapp.image_relay_failed",
                    correlation_id,
                    media_id,
                    error = %reason,
                    "continuing turn without the image"
                );
                if !text.is_empty() {
                    text.push('\n');
                }
                text.push_str(IMAGE_FAILURE_NOTE);
                (text, Vec::new())
            }
        }
    }

    async fn send(&self, to: &str, correlation_id: &str, body: &str) {
        if let Err(error) = self.sender.send_text(to, body).await {
            error!(event_name = "whatsapp.send_failed", correlation_id, to, error = %error, "reply not delivered");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use catalogbot_agent::{LlmError, TurnError};
    use catalogbot_db::repositories::InMemoryInboundLog;

    use super::{ConversationHandler, Disposition, InboundProcessor};
    use crate::client::{CloudApiError, FetchedMedia, MediaSource, MessageSender};
    use crate::media::{LocalMediaStore, MediaRelay};
    use crate::payload::{InboundContent, InboundMessage};
    use crate::reply::{IMAGE_FAILURE_NOTE, TURN_FAILURE_REPLY, UNSUPPORTED_MESSAGE_REPLY};

    #[derive(Default)]
    struct RecordingHandler {
        calls: Mutex<Vec<(String, Option<String>, String, Vec<String>)>>,
        reply: Option<String>,
    }

    #[async_trait]
    impl ConversationHandler for RecordingHandler {
        async fn handle(
            &self,
            user_id: &str,
            display_name: Option<&str>,
            text: &str,
            image_urls: &[String],
        ) -> Result<String, TurnError> {
            self.calls.lock().await.push((
                user_id.to_string(),
                display_name.map(str::to_string),
                text.to_string(),
                image_urls.to_vec(),
            ));
            self.reply.clone().ok_or_else(|| TurnError::Model(LlmError::Provider("down".to_string())))
        }
    }

    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl MessageSender for RecordingSender {
        async fn send_text(&self, to: &str, body: &str) -> Result<(), CloudApiError> {
            self.sent.lock().await.push((to.to_string(), body.to_string()));
            Ok(())
        }
    }

    struct NoMedia;

    #[async_trait]
    impl MediaSource for NoMedia {
        async fn fetch_media(&self, media_id: &str) -> Result<FetchedMedia, CloudApiError> {
            Err(CloudApiError::MissingMediaUrl { media_id: media_id.to_string() })
        }
    }

    struct Harness {
        processor: InboundProcessor,
        handler: Arc<RecordingHandler>,
        sender: Arc<RecordingSender>,
    }

    fn harness(reply: Option<&str>, media: Option<Arc<MediaRelay>>) -> Harness {
        let handler = Arc::new(RecordingHandler { reply: reply.map(str::to_string), ..Default::default() });
        let sender = Arc::new(RecordingSender::default());
        let processor = InboundProcessor::new(
            handler.clone(),
            sender.clone(),
            media,
            Arc::new(InMemoryInboundLog::default()),
        );
        Harness { processor, handler, sender }
    }

    fn text_message(id: &str, body: &str) -> InboundMessage {
        InboundMessage {
            message_id: id.to_string(),
            from: "2348012345678".to_string(),
            profile_name: Some("Ada".to_string()),
            content: InboundContent::Text(body.to_string()),
        }
    }

    #[tokio::test]
    async fn text_message_is_answered_once_per_message_id() {
        let h = harness(Some("You have 2 products."), None);

        let first = h.processor.process_message(text_message("wamid.1", "list")).await;
        let retry = h.processor.process_message(text_message("wamid.1", "list")).await;

        assert_eq!(first, Disposition::Replied);
        assert_eq!(retry, Disposition::Duplicate);
        assert_eq!(h.handler.calls.lock().await.len(), 1);
        assert_eq!(
            h.sender.sent.lock().await.as_slice(),
            [("2348012345678".to_string(), "You have 2 products.".to_string())]
        );
        assert_eq!(h.handler.calls.lock().await[0].1.as_deref(), Some("Ada"));
    }

    #[tokio::test]
    async fn turn_failure_sends_generic_apology() {
        let h = harness(None, None);

        let disposition = h.processor.process_message(text_message("wamid.2", "hi")).await;

        assert_eq!(disposition, Disposition::Failed);
        assert_eq!(h.sender.sent.lock().await[0].1, TURN_FAILURE_REPLY);
    }

    #[tokio::test]
    async fn unsupported_message_never_reaches_the_agent() {
        let h = harness(Some("unused"), None);
        let mut message = text_message("wamid.3", "");
        message.content = InboundContent::Unsupported { kind: "audio".to_string() };

        let disposition = h.processor.process_message(message).await;

        assert_eq!(disposition, Disposition::Unsupported);
        assert!(h.handler.calls.lock().await.is_empty());
        assert_eq!(h.sender.sent.lock().await[0].1, UNSUPPORTED_MESSAGE_REPLY);
    }

    #[tokio::test]
    async fn failed_image_relay_adds_note_and_continues() {
        let dir = tempfile::tempdir().expect("tempdir");
        let relay = Arc::new(MediaRelay::new(
            Arc::new(NoMedia),
            Arc::new(LocalMediaStore::new(dir.path(), "http://localhost:8000/media")),
            Duration::from_secs(5),
        ));
        let h = harness(Some("Nice shoes!"), Some(relay));
        let mut message = text_message("wamid.4", "");
        message.content = InboundContent::Image {
            media_id: "1479537139650973".to_string(),
            mime_type: Some("image/jpeg".to_string()),
            caption: Some("new stock".to_string()),
        };

        let disposition = h.processor.process_message(message).await;

        assert_eq!(disposition, Disposition::Replied);
        let calls = h.handler.calls.lock().await;
        assert_eq!(calls[0].2, format!("new stock\n{IMAGE_FAILURE_NOTE}"));
        assert!(calls[0].3.is_empty());
    }

    #[tokio::test]
    async fn captionless_image_with_failed_relay_sends_only_the_note() {
        let h = harness(Some("Got it."), None);
        let mut message = text_message("wamid.6", "");
        message.content = InboundContent::Image {
            media_id: "1479537139650974".to_string(),
            mime_type: Some("image/jpeg".to_string()),
            caption: None,
        };

        let disposition = h.processor.process_message(message).await;

        assert_eq!(disposition, Disposition::Replied);
        let calls = h.handler.calls.lock().await;
        assert_eq!(calls[0].2, IMAGE_FAILURE_NOTE);
        assert!(calls[0].3.is_empty());
    }

    #[tokio::test]
    async fn empty_agent_reply_becomes_fallback() {
        let h = harness(Some("  "), None);

        h.processor.process_message(text_message("wamid.5", "hi")).await;

        assert_eq!(h.sender.sent.lock().await[0].1, "I'm here to help! What would you like to do?");
    }
}
