use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use catalogbot_whatsapp::{InboundProcessor, WebhookPayload};

const MAX_IN_FLIGHT_TURNS: u32 = 256;

/// Counts spawned turns so shutdown can wait for them.
#[derive(Clone)]
pub struct InFlightTurns {
    permits: Arc<Semaphore>,
}

impl Default for InFlightTurns {
    fn default() -> Self {
        Self { permits: Arc::new(Semaphore::new(MAX_IN_FLIGHT_TURNS as usize)) }
    }
}

impl InFlightTurns {
    /// Waits until every running turn has finished or `grace` elapses.
    /// Returns whether the drain completed.
    pub async fn drain(&self, grace: Duration) -> bool {
        matches!(
            tokio::time::timeout(grace, self.permits.acquire_many(MAX_IN_FLIGHT_TURNS)).await,
            Ok(Ok(_))
        )
    }

    pub fn running(&self) -> usize {
        MAX_IN_FLIGHT_TURNS as usize - self.permits.available_permits()
    }
}

#[derive(Clone)]
pub struct WebhookState {
    verify_token: SecretString,
    processor: Arc<InboundProcessor>,
    in_flight: InFlightTurns,
}

impl WebhookState {
    pub fn new(verify_token: SecretString, processor: Arc<InboundProcessor>, in_flight: InFlightTurns) -> Self {
        Self { verify_token, processor, in_flight }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct VerifyParams {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
}

pub fn router(state: WebhookState) -> Router {
    Router::new().route("/webhook/whatsapp", get(verify).post(receive)).with_state(state)
}

async fn verify(State(state): State<WebhookState>, Query(params): Query<VerifyParams>) -> Response {
    let subscribed = params.mode.as_deref() == Some("subscribe");
    let token_matches = params.verify_token.as_deref() == Some(state.verify_token.expose_secret());

    match (subscribed && token_matches, params.challenge) {
        (true, Some(challenge)) => {
            info!(event_name = "webhook.verified", "webhook verification succeeded");
            (StatusCode::OK, challenge).into_response()
        }
        _ => {
            warn!(event_name = "webhook.verification_failed", "webhook verification token mismatch");
            (StatusCode::FORBIDDEN, "Verification failed").into_response()
        }
    }
}

/// Always answers 200 so the provider does not redeliver; each message is
/// processed on its own task.
async fn receive(State(state): State<WebhookState>, body: Bytes) -> Response {
    let payload = match serde_json::from_slice::<WebhookPayload>(&body) {
        Ok(payload) => payload,
        Err(error) => {
            warn!(event_name = "webhook.unparseable", error = %error, "webhook body ignored");
            return Json(json!({"status": "error", "message": "unreadable payload"})).into_response();
        }
    };

    let messages = payload.inbound_messages();
    if messages.is_empty() {
        debug!(
            event_name = "webhook.status_only",
            statuses = payload.status_update_count(),
            "ignoring status update"
        );
    }

    // The permit is taken before spawning so a drain never misses a queued turn.
    for message in messages {
        let Ok(permit) = state.in_flight.permits.clone().acquire_owned().await else {
            warn!(event_name = "webhook.turns_closed", "in-flight turn tracking closed; message dropped");
            break;
        };
        let processor = state.processor.clone();
        tokio::spawn(async move {
            let _permit = permit;
            processor.process_message(message).await;
        });
    }

    Json(json!({"status": "ok"})).into_response()
}
