use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::warn;

use catalogbot_core::catalog::outcome::ActionOutcome;
use catalogbot_core::catalog::validation::{FieldMap, ProductPatch};
use catalogbot_core::domain::product::{Product, ProductId};
use catalogbot_core::domain::seller::SellerId;
use catalogbot_core::errors::DomainError;
use catalogbot_db::repositories::{ProductRepository, RepositoryError};

pub const DEFAULT_LIST_LIMIT: u32 = 10;
pub const MAX_LIST_LIMIT: u32 = 50;

const STORE_UNAVAILABLE: &str = "The catalog is temporarily unavailable. Please try again shortly.";

/// Seller-scoped catalog operations. Every method returns an [`ActionOutcome`];
/// storage failures are reported in the outcome rather than raised.
pub struct CatalogService {
    products: Arc<dyn ProductRepository>,
}

impl CatalogService {
    pub fn new(products: Arc<dyn ProductRepository>) -> Self {
        Self { products }
    }

    pub async fn create_product(&self, seller_id: &SellerId, fields: &FieldMap) -> ActionOutcome {
        let patch = match ProductPatch::parse(fields) {
            Ok(patch) => patch,
            Err(error) => return ActionOutcome::failure(DomainError::from(error).to_string()),
        };

        let now = Utc::now();
        let product = match Product::from_patch(ProductId::generate(), seller_id.clone(), patch, now) {
            Ok(product) => product,
            Err(error) => return ActionOutcome::failure(error.to_string()),
        };

        let product_id = product.id.clone();
        let title = product.title.clone();
        if let Err(error) = self.products.insert(product).await {
            return store_failure("create_product", seller_id, error);
        }

        ActionOutcome::ok(json!({
            "product_id": product_id.0,
            "message": format!("Product '{title}' created successfully"),
        }))
    }

    pub async fn query_inventory(&self, seller_id: &SellerId, search_term: &str) -> ActionOutcome {
        match self.products.search_by_title(seller_id, search_term).await {
            Ok(products) => ActionOutcome::ok(json!({
                "results": products.iter().map(Product::summary).collect::<Vec<Value>>(),
                "total": products.len(),
            })),
            Err(error) => store_failure("query_inventory", seller_id, error),
        }
    }

    /// Checks ownership first, then validates only the fields being changed.
    /// Unknown and foreign ids fail with the same message whatever the fields.
    pub async fn update_product(
        &self,
        seller_id: &SellerId,
        product_id: &ProductId,
        updates: &FieldMap,
    ) -> ActionOutcome {
        let mut product = match self.products.find_owned(seller_id, product_id).await {
            Ok(Some(product)) => product,
            Ok(None) => return ActionOutcome::failure(DomainError::ProductNotAccessible.to_string()),
            Err(error) => return store_failure("update_product", seller_id, error),
        };

        let patch = match ProductPatch::parse(updates) {
            Ok(patch) => patch,
            Err(error) => return ActionOutcome::failure(DomainError::from(error).to_string()),
        };
        if patch.is_empty() {
            return ActionOutcome::failure("No updates provided");
        }

        product.apply(patch, Utc::now());
        match self.products.update(product).await {
            Ok(true) => ActionOutcome::ok(json!({
                "product_id": product_id.0,
                "message": "Product updated successfully",
            })),
            Ok(false) => ActionOutcome::failure(DomainError::ProductNotAccessible.to_string()),
            Err(error) => store_failure("update_product", seller_id, error),
        }
    }

    pub async fn list_products(&self, seller_id: &SellerId, limit: Option<i64>) -> ActionOutcome {
        let limit = clamp_limit(limit);

        let listed = match self.products.list(seller_id, limit).await {
            Ok(products) => products,
            Err(error) => return store_failure("list_products", seller_id, error),
        };
        let total = match self.products.count(seller_id).await {
            Ok(total) => total,
            Err(error) => return store_failure("list_products", seller_id, error),
        };

        ActionOutcome::ok(json!({
            "products": listed.iter().map(Product::summary).collect::<Vec<Value>>(),
            "total": total,
        }))
    }
}

fn clamp_limit(limit: Option<i64>) -> u32 {
    match limit {
        None => DEFAULT_LIST_LIMIT,
        Some(requested) => requested.clamp(1, i64::from(MAX_LIST_LIMIT)) as u32,
    }
}

fn store_failure(action: &'static str, seller_id: &SellerId, error: RepositoryError) -> ActionOutcome {
    warn!(
        event_name = "catalog.store_failure",
        action,
        seller_id = %seller_id.0,
        error = %error,
        "catalog store operation failed"
    );
    ActionOutcome::failure(STORE_UNAVAILABLE)
}
