use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::catalog::validation::ProductPatch;
use crate::domain::seller::SellerId;
use crate::errors::DomainError;

pub const CATEGORY_NAMES: &[&str] =
    &["fashion", "electronics", "home", "beauty", "sports", "food", "books", "other"];

pub const CONDITION_NAMES: &[&str] = &["new", "used", "refurbished"];

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductId(pub String);

impl ProductId {
    pub fn generate() -> Self {
        let raw = Uuid::new_v4().simple().to_string();
        Self(format!("PROD-{}", raw[..12].to_ascii_uppercase()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Fashion,
    Electronics,
    Home,
    Beauty,
    Sports,
    Food,
    Books,
    Other,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Self::Fashion,
        Self::Electronics,
        Self::Home,
        Self::Beauty,
        Self::Sports,
        Self::Food,
        Self::Books,
        Self::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fashion => "fashion",
            Self::Electronics => "electronics",
            Self::Home => "home",
            Self::Beauty => "beauty",
            Self::Sports => "sports",
            Self::Food => "food",
            Self::Books => "books",
            Self::Other => "other",
        }
    }

    /// Case-insensitive lookup; surrounding whitespace is ignored.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|category| category.as_str() == normalized)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    New,
    Used,
    Refurbished,
}

impl Condition {
    pub const ALL: [Condition; 3] = [Self::New, Self::Used, Self::Refurbished];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Used => "used",
            Self::Refurbished => "refurbished",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|condition| condition.as_str() == normalized)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub seller_id: SellerId,
    pub title: String,
    pub price: Decimal,
    pub category: Category,
    pub quantity: u32,
    pub condition: Condition,
    pub description: Option<String>,
    pub size: Option<String>,
    pub brand: Option<String>,
    pub image_urls: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to create a product, in the order they are reported when missing.
pub const REQUIRED_CREATE_FIELDS: &[&str] = &["title", "price", "category", "quantity", "condition"];

impl Product {
    /// Builds a product from an already validated patch. Every required field
    /// must be present.
    pub fn from_patch(
        id: ProductId,
        seller_id: SellerId,
        patch: ProductPatch,
        now: DateTime<Utc>,
    ) -> Result<Product, DomainError> {
        let missing = patch.missing_for_create();
        if !missing.is_empty() {
            return Err(DomainError::MissingFields(
                missing.into_iter().map(str::to_string).collect(),
            ));
        }

        let (Some(title), Some(price), Some(category), Some(quantity), Some(condition)) =
            (patch.title, patch.price, patch.category, patch.quantity, patch.condition)
        else {
            return Err(DomainError::InvariantViolation(
                "required product fields vanished after presence check".to_string(),
            ));
        };

        Ok(Product {
            id,
            seller_id,
            title,
            price,
            category,
            quantity,
            condition,
            description: patch.description,
            size: patch.size,
            brand: patch.brand,
            image_urls: patch.image_urls.unwrap_or_default(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Applies every field present in `patch`; absent fields are left untouched.
    pub fn apply(&mut self, patch: ProductPatch, now: DateTime<Utc>) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(price) = patch.price {
            self.price = price;
        }
        if let Some(category) = patch.category {
            self.category = category;
        }
        if let Some(quantity) = patch.quantity {
            self.quantity = quantity;
        }
        if let Some(condition) = patch.condition {
            self.condition = condition;
        }
        if let Some(description) = patch.description {
            self.description = Some(description);
        }
        if let Some(size) = patch.size {
            self.size = Some(size);
        }
        if let Some(brand) = patch.brand {
            self.brand = Some(brand);
        }
        if let Some(image_urls) = patch.image_urls {
            self.image_urls = image_urls;
        }
        self.updated_at = now;
    }

    pub fn title_matches(&self, search_term: &str) -> bool {
        let needle = search_term.trim().to_lowercase();
        needle.is_empty() || self.title.to_lowercase().contains(&needle)
    }

    /// Compact JSON view handed back to the language model.
    pub fn summary(&self) -> Value {
        json!({
            "product_id": self.id.0,
            "title": self.title,
            "price": self.price.to_f64().unwrap_or_default(),
            "category": self.category.as_str(),
            "quantity": self.quantity,
            "condition": self.condition.as_str(),
            "brand": self.brand,
            "size": self.size,
            "image_urls": self.image_urls,
        })
    }
}
