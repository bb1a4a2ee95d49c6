use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use catalogbot_core::domain::conversation::ConversationState;
use catalogbot_core::domain::product::{Product, ProductId};
use catalogbot_core::domain::seller::{Seller, SellerId};

use super::{
    expiry_after, ConversationStore, InboundLog, ProductRepository, RepositoryError,
    SellerRepository,
};

#[derive(Default)]
pub struct InMemoryProductRepository {
    products: RwLock<HashMap<String, Product>>,
}

impl InMemoryProductRepository {
    fn sorted_for(products: &HashMap<String, Product>, seller_id: &SellerId) -> Vec<Product> {
        let mut owned = products
            .values()
            .filter(|product| &product.seller_id == seller_id)
            .cloned()
            .collect::<Vec<_>>();
        owned.sort_by(|left, right| {
            left.created_at.cmp(&right.created_at).then_with(|| left.id.0.cmp(&right.id.0))
        });
        owned
    }
}

#[async_trait::async_trait]
impl ProductRepository for InMemoryProductRepository {
    async fn insert(&self, product: Product) -> Result<(), RepositoryError> {
        let mut products = self.products.write().await;
        if products.contains_key(&product.id.0) {
            return Err(RepositoryError::Decode(format!("duplicate product id `{}`", product.id.0)));
        }
        products.insert(product.id.0.clone(), product);
        Ok(())
    }

    async fn find_owned(
        &self,
        seller_id: &SellerId,
        id: &ProductId,
    ) -> Result<Option<Product>, RepositoryError> {
        let products = self.products.read().await;
        Ok(products.get(&id.0).filter(|product| &product.seller_id == seller_id).cloned())
    }

    async fn update(&self, product: Product) -> Result<bool, RepositoryError> {
        let mut products = self.products.write().await;
        match products.get_mut(&product.id.0) {
            Some(existing) if existing.seller_id == product.seller_id => {
                *existing = product;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn search_by_title(
        &self,
        seller_id: &SellerId,
        search_term: &str,
    ) -> Result<Vec<Product>, RepositoryError> {
        let products = self.products.read().await;
        Ok(Self::sorted_for(&products, seller_id)
            .into_iter()
            .filter(|product| product.title_matches(search_term))
            .collect())
    }

    async fn list(&self, seller_id: &SellerId, limit: u32) -> Result<Vec<Product>, RepositoryError> {
        let products = self.products.read().await;
        Ok(Self::sorted_for(&products, seller_id).into_iter().take(limit as usize).collect())
    }

    async fn count(&self, seller_id: &SellerId) -> Result<u64, RepositoryError> {
        let products = self.products.read().await;
        Ok(products.values().filter(|product| &product.seller_id == seller_id).count() as u64)
    }
}

#[derive(Default)]
pub struct InMemorySellerRepository {
    sellers: RwLock<HashMap<String, Seller>>,
}

#[async_trait::async_trait]
impl SellerRepository for InMemorySellerRepository {
    async fn find_by_contact(&self, contact: &str) -> Result<Option<Seller>, RepositoryError> {
        let sellers = self.sellers.read().await;
        Ok(sellers.get(contact).cloned())
    }

    async fn find_or_create(
        &self,
        contact: &str,
        display_name: Option<&str>,
    ) -> Result<Seller, RepositoryError> {
        let mut sellers = self.sellers.write().await;
        Ok(sellers
            .entry(contact.to_string())
            .or_insert_with(|| Seller::new(contact, display_name))
            .clone())
    }
}

#[derive(Default)]
pub struct InMemoryConversationStore {
    states: RwLock<HashMap<String, (ConversationState, DateTime<Utc>)>>,
}

#[async_trait::async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn get(&self, user_id: &str) -> Result<Option<ConversationState>, RepositoryError> {
        let states = self.states.read().await;
        let now = Utc::now();
        Ok(states
            .get(user_id)
            .filter(|(_, expires_at)| *expires_at > now)
            .map(|(state, _)| state.clone()))
    }

    async fn put(
        &self,
        user_id: &str,
        state: &ConversationState,
        ttl: Duration,
    ) -> Result<(), RepositoryError> {
        let mut states = self.states.write().await;
        states.insert(user_id.to_string(), (state.clone(), expiry_after(Utc::now(), ttl)));
        Ok(())
    }

    async fn delete(&self, user_id: &str) -> Result<bool, RepositoryError> {
        let mut states = self.states.write().await;
        Ok(states.remove(user_id).is_some())
    }

    async fn purge_expired(&self) -> Result<u64, RepositoryError> {
        let mut states = self.states.write().await;
        let now = Utc::now();
        let before = states.len();
        states.retain(|_, (_, expires_at)| *expires_at > now);
        Ok((before - states.len()) as u64)
    }
}

#[derive(Default)]
pub struct InMemoryInboundLog {
    seen: RwLock<HashMap<String, DateTime<Utc>>>,
}

#[async_trait::async_trait]
impl InboundLog for InMemoryInboundLog {
    async fn record_if_new(&self, message_id: &str) -> Result<bool, RepositoryError> {
        let mut seen = self.seen.write().await;
        if seen.contains_key(message_id) {
            return Ok(false);
        }
        seen.insert(message_id.to_string(), Utc::now());
        Ok(true)
    }

    async fn purge_older_than(&self, retention: Duration) -> Result<u64, RepositoryError> {
        let retention = chrono::Duration::from_std(retention)
            .map_err(|error| RepositoryError::Decode(format!("retention: {error}")))?;
        let cutoff = Utc::now() - retention;
        let mut seen = self.seen.write().await;
        let before = seen.len();
        seen.retain(|_, received_at| *received_at >= cutoff);
        Ok((before - seen.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;
    use rust_decimal::Decimal;

    use catalogbot_core::domain::conversation::{ChatMessage, ConversationState};
    use catalogbot_core::domain::product::{Category, Condition, Product, ProductId};
    use catalogbot_core::domain::seller::SellerId;

    use crate::repositories::{
        ConversationStore, InMemoryConversationStore, InMemoryInboundLog,
        InMemoryProductRepository, InMemorySellerRepository, InboundLog, ProductRepository,
        SellerRepository,
    };

    fn product(seller: &str, id: &str, title: &str) -> Product {
        let now = Utc::now();
        Product {
            id: ProductId(id.to_string()),
            seller_id: SellerId(seller.to_string()),
            title: title.to_string(),
            price: Decimal::from(15_000),
            category: Category::Electronics,
            quantity: 1,
            condition: Condition::Used,
            description: None,
            size: None,
            brand: None,
            image_urls: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn in_memory_products_are_seller_scoped() {
        let repo = InMemoryProductRepository::default();
        repo.insert(product("s1", "PROD-1", "iPhone 11")).await.expect("insert");
        repo.insert(product("s2", "PROD-2", "iPhone 12")).await.expect("insert");

        let s1 = SellerId("s1".to_string());
        assert_eq!(repo.search_by_title(&s1, "iphone").await.expect("search").len(), 1);
        assert!(repo.find_owned(&s1, &ProductId("PROD-2".to_string())).await.expect("find").is_none());

        let mut foreign = product("s1", "PROD-2", "stolen");
        foreign.quantity = 0;
        assert!(!repo.update(foreign).await.expect("update"));
        assert_eq!(repo.count(&s1).await.expect("count"), 1);
    }

    #[tokio::test]
    async fn in_memory_duplicate_insert_is_rejected() {
        let repo = InMemoryProductRepository::default();
        repo.insert(product("s1", "PROD-1", "Lamp")).await.expect("insert");
        assert!(repo.insert(product("s1", "PROD-1", "Lamp")).await.is_err());
    }

    #[tokio::test]
    async fn in_memory_seller_is_created_once() {
        let repo = InMemorySellerRepository::default();
        let first = repo.find_or_create("234801", Some("Ada")).await.expect("create");
        let second = repo.find_or_create("234801", None).await.expect("find");
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn in_memory_conversation_honours_ttl() {
        let store = InMemoryConversationStore::default();
        let mut state = ConversationState::new("u1", Utc::now());
        state.messages.push(ChatMessage::user("hello"));

        store.put("u1", &state, Duration::from_secs(60)).await.expect("put");
        assert_eq!(store.get("u1").await.expect("get"), Some(state.clone()));

        store.put("u1", &state, Duration::ZERO).await.expect("put");
        assert_eq!(store.get("u1").await.expect("get"), None);
        assert_eq!(store.purge_expired().await.expect("purge"), 1);
    }

    #[tokio::test]
    async fn in_memory_inbound_log_dedupes() {
        let log = InMemoryInboundLog::default();
        assert!(log.record_if_new("wamid.1").await.expect("first"));
        assert!(!log.record_if_new("wamid.1").await.expect("retry"));
    }
}
