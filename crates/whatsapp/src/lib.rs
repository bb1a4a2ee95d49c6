//! WhatsApp Cloud API transport for catalogbot.
//!
//! - **Payloads** (`payload`) - webhook envelope parsing into inbound messages
//! - **Client** (`client`) - sending replies and downloading media from the Graph API
//! - **Media** (`media`) - relaying short-lived media into a durable store
//! - **Inbound** (`inbound`) - de-duplication, image handling and the turn call
//! - **Reply** (`reply`) - fixed replies and the 4096 character cap
//!
//! ```text
//! POST /webhook/whatsapp → WebhookPayload → InboundProcessor → AgentRuntime
//!                                              ↓
//!                                  MessageSender ← reply
//! ```

pub mod client;
pub mod inbound;
pub mod media;
pub mod payload;
pub mod reply;

pub use client::{CloudApiClient, CloudApiError, MediaSource, MessageSender};
pub use inbound::{ConversationHandler, Disposition, InboundProcessor};
pub use media::{media_store_from_config, MediaError, MediaRelay, MediaStore};
pub use payload::WebhookPayload;
