use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_SELLER_NAME: &str = "Seller";

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SellerId(pub String);

impl SellerId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// A merchant, keyed by the external contact identity they message from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seller {
    pub id: SellerId,
    pub contact: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
}

impl Seller {
    pub fn new(contact: impl Into<String>, display_name: Option<&str>) -> Self {
        let display_name = display_name
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_SELLER_NAME)
            .to_string();

        Self { id: SellerId::generate(), contact: contact.into(), display_name, created_at: Utc::now() }
    }
}

#[cfg(test)]
mod tests {
    use super::{Seller, DEFAULT_SELLER_NAME};

    #[test]
    fn blank_display_name_falls_back_to_default() {
        let seller = Seller::new("2348012345678", Some("   "));
        assert_eq!(seller.display_name, DEFAULT_SELLER_NAME);

        let named = Seller::new("2348012345678", Some("Ada's Closet"));
        assert_eq!(named.display_name, "Ada's Closet");
        assert_ne!(seller.id, named.id);
    }
}
