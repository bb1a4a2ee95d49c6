//! Conversation-to-action orchestration for catalogbot.
//!
//! A seller's message goes through a bounded loop:
//! 1. **Model call** (`llm`) - history, rendered system prompt (`prompt`) and the action catalog
//! 2. **Guardrails** (`guardrails`) - requested actions are checked before anything runs
//! 3. **Dispatch** (`tools`, `catalog`) - seller-scoped catalog operations
//! 4. **Reply** - the model's final text becomes the assistant message
//!
//! `conversation` holds the per-turn state machine and `runtime` wraps it with
//! per-user locking and conversation persistence.
//!
//! The model only translates. Validation, ownership and storage decisions are
//! made by the catalog service, never by model output.

pub mod catalog;
pub mod conversation;
pub mod guardrails;
pub mod llm;
pub mod prompt;
pub mod runtime;
pub mod tools;

pub use conversation::{ConversationEngine, TurnError, TurnPhase, FALLBACK_REPLY};
pub use llm::{LlmClient, LlmError, ModelResponse, OpenAiCompatibleClient, ScriptedLlmClient};
pub use runtime::{AgentRuntime, RuntimeSettings, TurnOutcome};
