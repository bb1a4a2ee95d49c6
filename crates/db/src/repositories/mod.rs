use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

use catalogbot_core::domain::conversation::ConversationState;
use catalogbot_core::domain::product::{Product, ProductId};
use catalogbot_core::domain::seller::{Seller, SellerId};

pub mod conversation;
pub mod inbound;
pub mod memory;
pub mod product;
pub mod seller;

pub use conversation::SqlConversationStore;
pub use inbound::SqlInboundLog;
pub use memory::{
    InMemoryConversationStore, InMemoryInboundLog, InMemoryProductRepository,
    InMemorySellerRepository,
};
pub use product::SqlProductRepository;
pub use seller::SqlSellerRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Seller-scoped product storage. Reads never cross seller boundaries.
#[async_trait]
pub trait ProductRepository: Send + Sync {
    async fn insert(&self, product: Product) -> Result<(), RepositoryError>;

    /// Returns the product only when it belongs to `seller_id`.
    async fn find_owned(
        &self,
        seller_id: &SellerId,
        id: &ProductId,
    ) -> Result<Option<Product>, RepositoryError>;

    /// Overwrites an existing product. Returns `false` when no row matched.
    async fn update(&self, product: Product) -> Result<bool, RepositoryError>;

    /// Case-insensitive title substring match; an empty term matches everything.
    async fn search_by_title(
        &self,
        seller_id: &SellerId,
        search_term: &str,
    ) -> Result<Vec<Product>, RepositoryError>;

    /// Oldest first, ties broken by id.
    async fn list(&self, seller_id: &SellerId, limit: u32) -> Result<Vec<Product>, RepositoryError>;

    async fn count(&self, seller_id: &SellerId) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait SellerRepository: Send + Sync {
    async fn find_by_contact(&self, contact: &str) -> Result<Option<Seller>, RepositoryError>;

    /// Looks the seller up by contact, creating it on first contact.
    async fn find_or_create(
        &self,
        contact: &str,
        display_name: Option<&str>,
    ) -> Result<Seller, RepositoryError>;
}

/// Keyed conversation memory with expiry. Expired records read as absent.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn get(&self, user_id: &str) -> Result<Option<ConversationState>, RepositoryError>;

    async fn put(
        &self,
        user_id: &str,
        state: &ConversationState,
        ttl: Duration,
    ) -> Result<(), RepositoryError>;

    async fn delete(&self, user_id: &str) -> Result<bool, RepositoryError>;

    /// Removes expired records and returns how many were dropped.
    async fn purge_expired(&self) -> Result<u64, RepositoryError>;
}

/// Remembers provider message ids so redelivered webhooks are processed once.
#[async_trait]
pub trait InboundLog: Send + Sync {
    /// Returns `true` the first time `message_id` is seen.
    async fn record_if_new(&self, message_id: &str) -> Result<bool, RepositoryError>;

    /// Forgets ids first seen more than `retention` ago.
    async fn purge_older_than(&self, retention: Duration) -> Result<u64, RepositoryError>;
}

/// Fixed-width RFC 3339 so that text ordering in SQLite matches time ordering.
pub(crate) fn encode_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_timestamp(column: &str, raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("{column}: {error}")))
}

/// TTLs are capped at ten years so the encoded timestamp keeps a four-digit year.
pub(crate) fn expiry_after(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    let cap = chrono::Duration::days(3650);
    let ttl = chrono::Duration::from_std(ttl).map(|ttl| ttl.min(cap)).unwrap_or(cap);
    now + ttl
}
