use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info};

use catalogbot_core::config::WhatsAppConfig;

const SEND_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum CloudApiError {
    #[error("cloud api is not configured: {0}")]
    Configuration(String),
    #[error("cloud api request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("cloud api returned HTTP {status} for {operation}: {body}")]
    Status { operation: &'static str, status: u16, body: String },
    #[error("cloud api media lookup for `{media_id}` returned no download url")]
    MissingMediaUrl { media_id: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchedMedia {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send_text(&self, to: &str, body: &str) -> Result<(), CloudApiError>;
}

/// Resolves a provider media id to its bytes.
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn fetch_media(&self, media_id: &str) -> Result<FetchedMedia, CloudApiError>;
}

pub struct CloudApiClient {
    client: Client,
    base_url: String,
    phone_number_id: String,
    access_token: SecretString,
    media_timeout: Duration,
}

impl CloudApiClient {
    pub fn from_config(config: &WhatsAppConfig, media_timeout: Duration) -> Result<Self, CloudApiError> {
        config
            .require_credentials()
            .map_err(|error| CloudApiError::Configuration(error.to_string()))?;

        Ok(Self {
            client: Client::builder().build()?,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            phone_number_id: config.phone_number_id.clone(),
            access_token: config.access_token.clone(),
            media_timeout,
        })
    }

    async fn check(
        operation: &'static str,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, CloudApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(CloudApiError::Status { operation, status: status.as_u16(), body })
    }
}

#[async_trait]
impl MessageSender for CloudApiClient {
    async fn send_text(&self, to: &str, body: &str) -> Result<(), CloudApiError> {
        let url = format!("{}/{}/messages", self.base_url, self.phone_number_id);
        let payload = json!({
            "messaging_product": "whatsapp",
            "to": to,
            "text": {"body": body},
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.access_token.expose_secret())
            .timeout(SEND_TIMEOUT)
            .json(&payload)
            .send()
            .await?;
        Self::check("send_message", response).await?;

        info!(event_name = "whatsapp.message_sent", to, chars = body.chars().count(), "reply sent");
        Ok(())
    }
}

#[async_trait]
impl MediaSource for CloudApiClient {
    /// Two calls: the media id resolves to a short-lived URL, which is then
    /// downloaded with the same bearer token.
    async fn fetch_media(&self, media_id: &str) -> Result<FetchedMedia, CloudApiError> {
        let lookup = self
            .client
            .get(format!("{}/{}", self.base_url, media_id))
            .bearer_auth(self.access_token.expose_secret())
            .timeout(self.media_timeout)
            .send()
            .await?;
        let lookup: Value = Self::check("media_lookup", lookup).await?.json().await?;
        let Some(download_url) = lookup.get("url").and_then(Value::as_str) else {
            return Err(CloudApiError::MissingMediaUrl { media_id: media_id.to_string() });
        };
        let declared_type = lookup.get("mime_type").and_then(Value::as_str).map(str::to_string);

        let download = self
            .client
            .get(download_url)
            .bearer_auth(self.access_token.expose_secret())
            .timeout(self.media_timeout)
            .send()
            .await?;
        let download = Self::check("media_download", download).await?;
        let content_type = download
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .or(declared_type);
        let bytes = download.bytes().await?.to_vec();

        debug!(event_name = "whatsapp.media_fetched", media_id, bytes = bytes.len(), "media downloaded");
        Ok(FetchedMedia { bytes, content_type })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::extract::{Path, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use secrecy::SecretString;
    use serde_json::{json, Value};
    use tokio::sync::Mutex;

    use catalogbot_core::config::WhatsAppConfig;

    use super::{CloudApiClient, CloudApiError, MediaSource, MessageSender};

    #[derive(Clone, Default)]
    struct Recorded {
        sent: Arc<Mutex<Vec<(String, Value)>>>,
        base: Arc<Mutex<String>>,
    }

    async fn messages(
        State(recorded): State<Recorded>,
        Path(phone_number_id): Path<String>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> impl IntoResponse {
        if headers.get("authorization").and_then(|value| value.to_str().ok()) != Some("Bearer token-123") {
            return (StatusCode::UNAUTHORIZED, Json(json!({"error": "bad token"})));
        }
        recorded.sent.lock().await.push((phone_number_id, body));
        (StatusCode::OK, Json(json!({"messages": [{"id": "wamid.out"}]})))
    }

    async fn media_lookup(State(recorded): State<Recorded>, Path(media_id): Path<String>) -> Json<Value> {
        let base = recorded.base.lock().await.clone();
        Json(json!({"url": format!("{base}/download/{media_id}"), "mime_type": "image/png"}))
    }

    async fn media_download() -> impl IntoResponse {
        ([("content-type", "image/png")], vec![0x89_u8, b'P', b'N', b'G'])
    }

    async fn start() -> (String, Recorded) {
        let recorded = Recorded::default();
        let app = Router::new()
            .route("/{phone_number_id}/messages", post(messages))
            .route("/download/{media_id}", get(media_download))
            .route("/{media_id}", get(media_lookup))
            .with_state(recorded.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let base = format!("http://{}", listener.local_addr().expect("address"));
        *recorded.base.lock().await = base.clone();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        (base, recorded)
    }

    fn config(base: &str, token: &str) -> WhatsAppConfig {
        WhatsAppConfig {
            access_token: SecretString::from(token.to_string()),
            phone_number_id: "106540352242922".to_string(),
            verify_token: SecretString::from("verify-me".to_string()),
            api_base_url: base.to_string(),
        }
    }

    #[tokio::test]
    async fn send_text_posts_graph_message() {
        let (base, recorded) = start().await;
        let client = CloudApiClient::from_config(&config(&base, "token-123"), Duration::from_secs(5))
            .expect("client");

        client.send_text("2348012345678", "Product created!").await.expect("send");

        let sent = recorded.sent.lock().await;
        assert_eq!(sent[0].0, "106540352242922");
        assert_eq!(
            sent[0].1,
            json!({"messaging_product": "whatsapp", "to": "2348012345678", "text": {"body": "Product created!"}})
        );
    }

    #[tokio::test]
    async fn rejected_token_surfaces_status() {
        let (base, _) = start().await;
        let client = CloudApiClient::from_config(&config(&base, "wrong"), Duration::from_secs(5))
            .expect("client");

        let error = client.send_text("234801", "hi").await.expect_err("unauthorized");

        assert!(matches!(error, CloudApiError::Status { status: 401, operation: "send_message", .. }));
    }

    #[tokio::test]
    async fn media_is_resolved_then_downloaded() {
        let (base, _) = start().await;
        let client = CloudApiClient::from_config(&config(&base, "token-123"), Duration::from_secs(5))
            .expect("client");

        let media = client.fetch_media("1479537139650973").await.expect("media");

        assert_eq!(media.bytes, vec![0x89, b'P', b'N', b'G']);
        assert_eq!(media.content_type.as_deref(), Some("image/png"));
    }

    #[test]
    fn missing_credentials_are_rejected() {
        let result = CloudApiClient::from_config(&config("http://localhost", ""), Duration::from_secs(5));

        assert!(matches!(result, Err(CloudApiError::Configuration(_))));
    }
}
