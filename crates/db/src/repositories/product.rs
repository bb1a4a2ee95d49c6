use std::str::FromStr;

use rust_decimal::Decimal;
use sqlx::Row;

use catalogbot_core::domain::product::{Category, Condition, Product, ProductId};
use catalogbot_core::domain::seller::SellerId;

use super::{decode_timestamp, encode_timestamp, ProductRepository, RepositoryError};
use crate::DbPool;

const PRODUCT_COLUMNS: &str = "id, seller_id, title, price, category, quantity, condition,
     description, size, brand, image_urls_json, created_at, updated_at";

pub struct SqlProductRepository {
    pool: DbPool,
}

impl SqlProductRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn decode_err(error: sqlx::Error) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}

fn row_to_product(row: &sqlx::sqlite::SqliteRow) -> Result<Product, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_err)?;
    let seller_id: String = row.try_get("seller_id").map_err(decode_err)?;
    let title: String = row.try_get("title").map_err(decode_err)?;
    let price: String = row.try_get("price").map_err(decode_err)?;
    let category: String = row.try_get("category").map_err(decode_err)?;
    let quantity: i64 = row.try_get("quantity").map_err(decode_err)?;
    let condition: String = row.try_get("condition").map_err(decode_err)?;
    let description: Option<String> = row.try_get("description").map_err(decode_err)?;
    let size: Option<String> = row.try_get("size").map_err(decode_err)?;
    let brand: Option<String> = row.try_get("brand").map_err(decode_err)?;
    let image_urls_json: String = row.try_get("image_urls_json").map_err(decode_err)?;
    let created_at: String = row.try_get("created_at").map_err(decode_err)?;
    let updated_at: String = row.try_get("updated_at").map_err(decode_err)?;

    Ok(Product {
        price: Decimal::from_str(&price)
            .map_err(|error| RepositoryError::Decode(format!("price `{price}`: {error}")))?,
        category: Category::parse(&category)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown category `{category}`")))?,
        quantity: u32::try_from(quantity)
            .map_err(|_| RepositoryError::Decode(format!("quantity out of range: {quantity}")))?,
        condition: Condition::parse(&condition)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown condition `{condition}`")))?,
        image_urls: serde_json::from_str(&image_urls_json)
            .map_err(|error| RepositoryError::Decode(format!("image_urls_json: {error}")))?,
        created_at: decode_timestamp("created_at", &created_at)?,
        updated_at: decode_timestamp("updated_at", &updated_at)?,
        id: ProductId(id),
        seller_id: SellerId(seller_id),
        title,
        description,
        size,
        brand,
    })
}

fn encode_image_urls(product: &Product) -> Result<String, RepositoryError> {
    serde_json::to_string(&product.image_urls)
        .map_err(|error| RepositoryError::Decode(format!("image_urls: {error}")))
}

/// SQLite's `lower()` only folds ASCII, so titles are folded here and stored
/// alongside the original.
fn fold_title(title: &str) -> String {
    title.to_lowercase()
}

/// Escapes `LIKE` wildcards so a search term is matched literally.
fn like_pattern(search_term: &str) -> String {
    let mut escaped = String::with_capacity(search_term.len() + 2);
    escaped.push('%');
    for ch in fold_title(search_term.trim()).chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

#[async_trait::async_trait]
impl ProductRepository for SqlProductRepository {
    async fn insert(&self, product: Product) -> Result<(), RepositoryError> {
        let image_urls_json = encode_image_urls(&product)?;

        sqlx::query(
            "INSERT INTO product (id, seller_id, title, title_folded, price, category, quantity,
                                  condition, description, size, brand, image_urls_json,
                                  created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&product.id.0)
        .bind(&product.seller_id.0)
        .bind(&product.title)
        .bind(fold_title(&product.title))
        .bind(product.price.normalize().to_string())
        .bind(product.category.as_str())
        .bind(i64::from(product.quantity))
        .bind(product.condition.as_str())
        .bind(&product.description)
        .bind(&product.size)
        .bind(&product.brand)
        .bind(image_urls_json)
        .bind(encode_timestamp(product.created_at))
        .bind(encode_timestamp(product.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_owned(
        &self,
        seller_id: &SellerId,
        id: &ProductId,
    ) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM product WHERE id = ? AND seller_id = ?"
        ))
        .bind(&id.0)
        .bind(&seller_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_product).transpose()
    }

    async fn update(&self, product: Product) -> Result<bool, RepositoryError> {
        let image_urls_json = encode_image_urls(&product)?;

        let result = sqlx::query(
            "UPDATE product
             SET title = ?, title_folded = ?, price = ?, category = ?, quantity = ?, condition = ?,
                 description = ?, size = ?, brand = ?, image_urls_json = ?, updated_at = ?
             WHERE id = ? AND seller_id = ?",
        )
        .bind(&product.title)
        .bind(fold_title(&product.title))
        .bind(product.price.normalize().to_string())
        .bind(product.category.as_str())
        .bind(i64::from(product.quantity))
        .bind(product.condition.as_str())
        .bind(&product.description)
        .bind(&product.size)
        .bind(&product.brand)
        .bind(image_urls_json)
        .bind(encode_timestamp(product.updated_at))
        .bind(&product.id.0)
        .bind(&product.seller_id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn search_by_title(
        &self,
        seller_id: &SellerId,
        search_term: &str,
    ) -> Result<Vec<Product>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM product
             WHERE seller_id = ? AND title_folded LIKE ? ESCAPE '\\'
             ORDER BY created_at ASC, id ASC"
        ))
        .bind(&seller_id.0)
        .bind(like_pattern(search_term))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_product).collect()
    }

    async fn list(&self, seller_id: &SellerId, limit: u32) -> Result<Vec<Product>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM product
             WHERE seller_id = ?
             ORDER BY created_at ASC, id ASC
             LIMIT ?"
        ))
        .bind(&seller_id.0)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_product).collect()
    }

    async fn count(&self, seller_id: &SellerId) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query("SELECT COUNT(*) AS count FROM product WHERE seller_id = ?")
            .bind(&seller_id.0)
            .fetch_one(&self.pool)
            .await?
            .try_get("count")
            .map_err(decode_err)?;

        Ok(u64::try_from(count).unwrap_or_default())
    }
}
