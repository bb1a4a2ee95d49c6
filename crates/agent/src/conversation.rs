use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};

use catalogbot_core::catalog::outcome::ActionOutcome;
use catalogbot_core::domain::conversation::{ChatMessage, ConversationState, ToolCallRecord};
use catalogbot_core::domain::seller::Seller;
use catalogbot_core::errors::ApplicationError;
use catalogbot_db::repositories::RepositoryError;

use crate::guardrails::{GuardrailDecision, GuardrailPolicy};
use crate::llm::{LlmClient, LlmError, ModelRequest, ModelResponse};
use crate::prompt::{render_system_prompt, PromptError};
use crate::tools::ToolRegistry;

pub const FALLBACK_REPLY: &str = "I'm here to help! What would you like to do?";

#[derive(Debug, Error)]
pub enum TurnError {
    #[error(transparent)]
    Model(#[from] LlmError),
    #[error(transparent)]
    Prompt(#[from] PromptError),
    #[error("seller lookup failed: {0}")]
    Seller(#[source] RepositoryError),
    #[error("turn did not finish within {0:?}")]
    TimedOut(std::time::Duration),
}

impl From<&TurnError> for ApplicationError {
    fn from(error: &TurnError) -> Self {
        match error {
            TurnError::Model(LlmError::Configuration(message)) => Self::Configuration(message.clone()),
            TurnError::Prompt(prompt) => Self::Configuration(prompt.to_string()),
            TurnError::Seller(repository) => Self::Persistence(repository.to_string()),
            TurnError::Model(_) | TurnError::TimedOut(_) => Self::Integration(error.to_string()),
        }
    }
}

/// Where a single turn currently is. A turn always starts at `Idle` and ends
/// by leaving `Replying`.
#[derive(Clone, Debug, PartialEq)]
pub enum TurnPhase {
    Idle,
    AwaitingModel,
    Dispatching { content: String, calls: Vec<ToolCallRecord> },
    Replying { text: String },
}

pub struct ConversationEngine {
    llm: Arc<dyn LlmClient>,
    tools: Arc<ToolRegistry>,
    guardrails: GuardrailPolicy,
    max_dispatch_rounds: u32,
}

impl ConversationEngine {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        tools: Arc<ToolRegistry>,
        guardrails: GuardrailPolicy,
        max_dispatch_rounds: u32,
    ) -> Self {
        Self { llm, tools, guardrails, max_dispatch_rounds: max_dispatch_rounds.max(1) }
    }

    /// Runs one turn against `state`, which the caller treats as a working copy:
    /// on `Err` it must be thrown away.
    pub async fn run_turn(
        &self,
        state: &mut ConversationState,
        seller: &Seller,
        text: &str,
        image_urls: &[String],
    ) -> Result<String, TurnError> {
        let mut phase = TurnPhase::Idle;
        let mut rounds = 0;
        let mut outcomes: Vec<ActionOutcome> = Vec::new();

        loop {
            phase = match phase {
                TurnPhase::Idle => {
                    state.messages.push(ChatMessage::user(compose_user_message(text, image_urls)));
                    TurnPhase::AwaitingModel
                }
                TurnPhase::AwaitingModel => {
                    let response = self.call_model(state, seller).await?;
                    self.next_phase(state, response, rounds, &outcomes)
                }
                TurnPhase::Dispatching { content, calls } => {
                    rounds += 1;
                    self.dispatch(state, seller, content, calls, &mut outcomes).await;
                    TurnPhase::AwaitingModel
                }
                TurnPhase::Replying { text } => {
                    let reply = if text.trim().is_empty() { FALLBACK_REPLY.to_string() } else { text };
                    state.messages.push(ChatMessage::assistant(reply.clone()));
                    state.updated_at = Utc::now();
                    return Ok(reply);
                }
            };
        }
    }

    async fn call_model(
        &self,
        state: &ConversationState,
        seller: &Seller,
    ) -> Result<ModelResponse, TurnError> {
        let request = ModelRequest {
            system_prompt: render_system_prompt(&seller.display_name, state.pending_action.as_ref())?,
            messages: state.messages.clone(),
            tools: self.tools.specs(),
        };
        Ok(self.llm.complete(&request).await?)
    }

    fn next_phase(
        &self,
        state: &mut ConversationState,
        response: ModelResponse,
        rounds: u32,
        outcomes: &[ActionOutcome],
    ) -> TurnPhase {
        let content = response.content.unwrap_or_default();
        if response.tool_calls.is_empty() {
            return TurnPhase::Replying { text: content };
        }

        if rounds >= self.max_dispatch_rounds {
            debug!(
                event_name = "agent.dispatch_rounds_exhausted",
                user_id = %state.user_id,
                ignored_calls = response.tool_calls.len(),
                "ignoring further action requests this turn"
            );
            let text = if content.trim().is_empty() { summarize(outcomes) } else { content };
            return TurnPhase::Replying { text };
        }

        match self.guardrails.review(&response.tool_calls, &self.tools) {
            GuardrailDecision::Allow(calls) => TurnPhase::Dispatching { content, calls },
            GuardrailDecision::Clarify { reason_code, user_message, pending } => {
                info!(
                    event_name = "agent.clarify",
                    user_id = %state.user_id,
                    reason_code,
                    "model requested an action that cannot be dispatched"
                );
                if pending.is_some() {
                    state.pending_action = pending;
                }
                TurnPhase::Replying { text: user_message }
            }
        }
    }

    async fn dispatch(
        &self,
        state: &mut ConversationState,
        seller: &Seller,
        content: String,
        calls: Vec<ToolCallRecord>,
        outcomes: &mut Vec<ActionOutcome>,
    ) {
        state.messages.push(ChatMessage::assistant_tool_calls(content, calls.clone()));

        for call in calls {
            let arguments = call.arguments.as_object().cloned().unwrap_or_default();
            let outcome = match self.tools.get(&call.name) {
                Some(tool) => tool.execute(&seller.id, &arguments).await,
                None => ActionOutcome::failure(format!("Unknown action `{}`", call.name)),
            };

            if outcome.success {
                info!(
                    event_name = "agent.dispatch",
                    user_id = %state.user_id,
                    action = %call.name,
                    "catalog action succeeded"
                );
                if state.pending_action.as_ref().is_some_and(|pending| pending.action == call.name) {
                    state.pending_action = None;
                }
            } else {
                warn!(
                    event_name = "agent.dispatch",
                    user_id = %state.user_id,
                    action = %call.name,
                    error = outcome.error.as_deref().unwrap_or_default(),
                    "catalog action failed"
                );
            }

            state.messages.push(ChatMessage::tool_result(call.id, outcome.to_json_string()));
            outcomes.push(outcome);
        }
    }
}

/// Image references are inlined so the model sees them as part of the text.
pub fn compose_user_message(text: &str, image_urls: &[String]) -> String {
    if image_urls.is_empty() {
        return text.to_string();
    }

    let attached = format!("[Attached images: {}]", image_urls.join(", "));
    if text.trim().is_empty() {
        attached
    } else {
        format!("{text}\n{attached}")
    }
}

fn summarize(outcomes: &[ActionOutcome]) -> String {
    outcomes
        .iter()
        .map(|outcome| match (&outcome.error, outcome.get("message").and_then(|m| m.as_str())) {
            (Some(error), _) => error.clone(),
            (None, Some(message)) => message.to_string(),
            (None, None) => "Done.".to_string(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
