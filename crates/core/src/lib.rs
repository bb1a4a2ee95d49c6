//! Catalog and conversation domain for catalogbot.
//!
//! Everything in this crate is deterministic and free of I/O:
//! - **Domain** (`domain`) - products, sellers, and per-user conversation state
//! - **Catalog rules** (`catalog`) - field validation and the uniform action outcome shape
//! - **Configuration** (`config`) - layered file/env/override loading
//! - **Errors** (`errors`) - domain → application → interface error mapping

pub mod catalog;
pub mod config;
pub mod domain;
pub mod errors;

pub use catalog::outcome::ActionOutcome;
pub use catalog::validation::{validate, FieldMap, ProductPatch, ValidationError};
pub use domain::conversation::{
    ChatMessage, ConversationState, PendingAction, Role, ToolCallRecord,
};
pub use domain::product::{Category, Condition, Product, ProductId};
pub use domain::seller::{Seller, SellerId};
pub use errors::{ApplicationError, DomainError, InterfaceError};

pub use chrono;
pub use rust_decimal;
