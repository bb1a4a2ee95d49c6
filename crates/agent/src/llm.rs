use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use catalogbot_core::config::LlmConfig;
use catalogbot_core::domain::conversation::{ChatMessage, Role};

/// A function the model may ask us to call, in JSON-schema form.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ModelRequest {
    pub system_prompt: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolSpec>,
}

/// An action request exactly as the model produced it. Arguments are kept raw
/// because model output is untrusted and may not even be JSON.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestedCall {
    pub id: String,
    pub name: String,
    pub raw_arguments: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModelResponse {
    pub content: Option<String>,
    pub tool_calls: Vec<RequestedCall>,
}

impl ModelResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self { content: Some(content.into()), tool_calls: Vec::new() }
    }

    pub fn tool_call(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            content: None,
            tool_calls: vec![RequestedCall {
                id: format!("call_{}", Uuid::new_v4().simple()),
                name: name.into(),
                raw_arguments: arguments.to_string(),
            }],
        }
    }

    pub fn text_content(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("language model transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("language model returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("language model response was malformed: {0}")]
    MalformedResponse(String),
    #[error("language model is not configured: {0}")]
    Configuration(String),
    #[error("language model call failed: {0}")]
    Provider(String),
}

impl LlmError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(error) => error.is_timeout() || error.is_connect(),
            Self::Status { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS.as_u16() || *status >= 500
            }
            _ => false,
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: &ModelRequest) -> Result<ModelResponse, LlmError>;
}

/// Client for `/chat/completions` endpoints that speak the OpenAI function
/// calling dialect (OpenRouter, OpenAI, Ollama).
pub struct OpenAiCompatibleClient {
    client: Client,
    base_url: String,
    api_key: Option<SecretString>,
    model: String,
    max_retries: u32,
    retry_base_delay: Duration,
}

impl OpenAiCompatibleClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        config
            .require_credentials()
            .map_err(|error| LlmError::Configuration(error.to_string()))?;

        let client = Client::builder().timeout(Duration::from_secs(config.timeout_secs)).build()?;

        Ok(Self {
            client,
            base_url: config.effective_base_url(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_retries: config.max_retries,
            retry_base_delay: Duration::from_millis(500),
        })
    }

    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    async fn post(&self, payload: &Value) -> Result<Value, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut request = self.client.post(&url).json(payload);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::OK {
            return Ok(response.json().await?);
        }

        let body = response.text().await.unwrap_or_default();
        Err(LlmError::Status { status: status.as_u16(), body: truncate_for_log(&body) })
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn complete(&self, request: &ModelRequest) -> Result<ModelResponse, LlmError> {
        let payload = to_chat_payload(&self.model, request);
        let mut attempt = 0;

        loop {
            match self.post(&payload).await {
                Ok(body) => return parse_chat_response(&body),
                Err(error) if error.is_retryable() && attempt < self.max_retries => {
                    let delay = self.retry_base_delay * 2u32.saturating_pow(attempt);
                    attempt += 1;
                    warn!(
                        event_name = "llm.retry",
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "retrying language model call"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

/// Builds the `/chat/completions` request body.
pub fn to_chat_payload(model: &str, request: &ModelRequest) -> Value {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    messages.push(json!({"role": "system", "content": request.system_prompt}));
    messages.extend(request.messages.iter().map(message_to_spec));

    let mut payload = json!({
        "model": model,
        "messages": messages,
    });

    if !request.tools.is_empty() {
        let tools = request
            .tools
            .iter()
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": tool.parameters,
                    }
                })
            })
            .collect::<Vec<_>>();
        payload["tools"] = Value::Array(tools);
        payload["tool_choice"] = json!("auto");
    }

    payload
}

fn message_to_spec(message: &ChatMessage) -> Value {
    match message.role {
        Role::User => json!({"role": "user", "content": message.content}),
        Role::Assistant if message.tool_calls.is_empty() => {
            json!({"role": "assistant", "content": message.content})
        }
        Role::Assistant => {
            let tool_calls = message
                .tool_calls
                .iter()
                .map(|call| {
                    json!({
                        "id": call.id,
                        "type": "function",
                        "function": {
                            "name": call.name,
                            "arguments": call.arguments.to_string(),
                        }
                    })
                })
                .collect::<Vec<_>>();
            let content =
                if message.content.is_empty() { Value::Null } else { json!(message.content) };
            json!({"role": "assistant", "content": content, "tool_calls": tool_calls})
        }
        Role::Tool => json!({
            "role": "tool",
            "tool_call_id": message.tool_call_id,
            "content": message.content,
        }),
    }
}

/// Reads `choices[0].message`. Arguments are accepted either as a JSON string
/// or, as some providers send them, an inline object.
pub fn parse_chat_response(body: &Value) -> Result<ModelResponse, LlmError> {
    let message = body
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .ok_or_else(|| LlmError::MalformedResponse("missing choices[0].message".to_string()))?;

    let content = message
        .get("content")
        .and_then(Value::as_str)
        .map(str::to_string)
        .filter(|content| !content.trim().is_empty());

    let tool_calls = message
        .get("tool_calls")
        .and_then(Value::as_array)
        .map(|calls| calls.iter().map(parse_tool_call).collect::<Result<Vec<_>, _>>())
        .transpose()?
        .unwrap_or_default();

    debug!(
        event_name = "llm.response",
        has_content = content.is_some(),
        tool_calls = tool_calls.len(),
        "language model responded"
    );

    Ok(ModelResponse { content, tool_calls })
}

fn parse_tool_call(call: &Value) -> Result<RequestedCall, LlmError> {
    let function = call
        .get("function")
        .and_then(Value::as_object)
        .ok_or_else(|| LlmError::MalformedResponse("tool call without function".to_string()))?;

    let name = function.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
    let raw_arguments = match function.get("arguments") {
        Some(Value::String(raw)) => raw.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };
    let id = call
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("call_{}", Uuid::new_v4().simple()));

    Ok(RequestedCall { id, name, raw_arguments })
}

fn truncate_for_log(body: &str) -> String {
    const LIMIT: usize = 512;
    match body.char_indices().nth(LIMIT) {
        Some((index, _)) => format!("{}…", &body[..index]),
        None => body.to_string(),
    }
}

/// Replays canned responses in order and records every request it receives.
/// Used by tests and for offline sessions.
#[derive(Default)]
pub struct ScriptedLlmClient {
    responses: Mutex<VecDeque<Result<ModelResponse, String>>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedLlmClient {
    pub fn new(responses: impl IntoIterator<Item = ModelResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(Ok).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub async fn push_response(&self, response: ModelResponse) {
        self.responses.lock().await.push_back(Ok(response));
    }

    pub async fn push_failure(&self, message: impl Into<String>) {
        self.responses.lock().await.push_back(Err(message.into()));
    }

    pub async fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn remaining(&self) -> usize {
        self.responses.lock().await.len()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, request: &ModelRequest) -> Result<ModelResponse, LlmError> {
        self.requests.lock().await.push(request.clone());
        match self.responses.lock().await.pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(LlmError::Provider(message)),
            None => Err(LlmError::Provider("no scripted response left".to_string())),
        }
    }
}
