use sqlx::Row;

use catalogbot_core::domain::seller::{Seller, SellerId};

use super::{decode_timestamp, encode_timestamp, RepositoryError, SellerRepository};
use crate::DbPool;

pub struct SqlSellerRepository {
    pool: DbPool,
}

impl SqlSellerRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_seller(row: &sqlx::sqlite::SqliteRow) -> Result<Seller, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let contact: String =
        row.try_get("contact").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let display_name: String =
        row.try_get("display_name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(Seller {
        id: SellerId(id),
        contact,
        display_name,
        created_at: decode_timestamp("created_at", &created_at)?,
    })
}

#[async_trait::async_trait]
impl SellerRepository for SqlSellerRepository {
    async fn find_by_contact(&self, contact: &str) -> Result<Option<Seller>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, contact, display_name, created_at FROM seller WHERE contact = ?",
        )
        .bind(contact)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_seller).transpose()
    }

    async fn find_or_create(
        &self,
        contact: &str,
        display_name: Option<&str>,
    ) -> Result<Seller, RepositoryError> {
        if let Some(existing) = self.find_by_contact(contact).await? {
            return Ok(existing);
        }

        // Two first messages can race here; the unique contact column keeps one row.
        let candidate = Seller::new(contact, display_name);
        sqlx::query(
            "INSERT INTO seller (id, contact, display_name, created_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(contact) DO NOTHING",
        )
        .bind(&candidate.id.0)
        .bind(&candidate.contact)
        .bind(&candidate.display_name)
        .bind(encode_timestamp(candidate.created_at))
        .execute(&self.pool)
        .await?;

        self.find_by_contact(contact).await?.ok_or_else(|| {
            RepositoryError::Decode(format!("seller for contact `{contact}` vanished after insert"))
        })
    }
}
