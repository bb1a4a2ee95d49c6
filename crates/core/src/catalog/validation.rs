use std::str::FromStr;

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::product::{Category, Condition, CATEGORY_NAMES, CONDITION_NAMES};

/// A partial product as the model sends it: a JSON object of field name to value.
pub type FieldMap = Map<String, Value>;

const TEXT_FIELDS: [&str; 4] = ["title", "description", "size", "brand"];

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Price must be greater than 0")]
    Price,
    #[error("Quantity must be 0 or greater")]
    Quantity,
    #[error("Category must be one of: {}", CATEGORY_NAMES.join(", "))]
    Category,
    #[error("Condition must be one of: {}", CONDITION_NAMES.join(", "))]
    Condition,
    #[error("{0} must be text")]
    Text(&'static str),
    #[error("Title must not be empty")]
    EmptyTitle,
    #[error("image_urls must be a list of URLs")]
    ImageUrls,
}

/// Checks the fields that are present; absent fields are not an error here.
/// The first failing rule wins.
pub fn validate(fields: &FieldMap) -> Result<(), ValidationError> {
    ProductPatch::parse(fields).map(|_| ())
}

/// Typed, normalized view of a [`FieldMap`]. Every `Some` field passed validation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProductPatch {
    pub title: Option<String>,
    pub price: Option<Decimal>,
    pub category: Option<Category>,
    pub quantity: Option<u32>,
    pub condition: Option<Condition>,
    pub description: Option<String>,
    pub size: Option<String>,
    pub brand: Option<String>,
    pub image_urls: Option<Vec<String>>,
}

impl ProductPatch {
    pub fn parse(fields: &FieldMap) -> Result<Self, ValidationError> {
        let price = present(fields, "price").map(parse_price).transpose()?;
        let quantity = present(fields, "quantity").map(parse_quantity).transpose()?;
        let category = present(fields, "category")
            .map(|value| value.as_str().and_then(Category::parse).ok_or(ValidationError::Category))
            .transpose()?;
        let condition = present(fields, "condition")
            .map(|value| value.as_str().and_then(Condition::parse).ok_or(ValidationError::Condition))
            .transpose()?;

        let mut text = [None, None, None, None];
        for (slot, field) in text.iter_mut().zip(TEXT_FIELDS) {
            *slot = present(fields, field).map(|value| parse_text(field, value)).transpose()?;
        }
        let [title, description, size, brand] = text;

        if title.as_deref().is_some_and(|title| title.trim().is_empty()) {
            return Err(ValidationError::EmptyTitle);
        }

        let image_urls = present(fields, "image_urls").map(parse_image_urls).transpose()?;

        Ok(Self {
            title: title.map(|title| title.trim().to_string()),
            price,
            category,
            quantity,
            condition,
            description,
            size,
            brand,
            image_urls,
        })
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Required create fields that are still absent, in reporting order.
    pub fn missing_for_create(&self) -> Vec<&'static str> {
        [
            ("title", self.title.is_none()),
            ("price", self.price.is_none()),
            ("category", self.category.is_none()),
            ("quantity", self.quantity.is_none()),
            ("condition", self.condition.is_none()),
        ]
        .into_iter()
        .filter_map(|(field, missing)| missing.then_some(field))
        .collect()
    }
}

/// JSON `null` is treated the same as an absent key.
fn present<'a>(fields: &'a FieldMap, key: &str) -> Option<&'a Value> {
    fields.get(key).filter(|value| !value.is_null())
}

fn parse_price(value: &Value) -> Result<Decimal, ValidationError> {
    let Value::Number(number) = value else {
        return Err(ValidationError::Price);
    };

    let price = Decimal::from_str(&number.to_string())
        .ok()
        .or_else(|| number.as_f64().and_then(Decimal::from_f64))
        .ok_or(ValidationError::Price)?;

    if price > Decimal::ZERO {
        Ok(price)
    } else {
        Err(ValidationError::Price)
    }
}

fn parse_quantity(value: &Value) -> Result<u32, ValidationError> {
    value.as_u64().and_then(|quantity| u32::try_from(quantity).ok()).ok_or(ValidationError::Quantity)
}

fn parse_text(field: &'static str, value: &Value) -> Result<String, ValidationError> {
    match value {
        Value::String(text) => Ok(text.clone()),
        Value::Number(number) => Ok(number.to_string()),
        _ => Err(ValidationError::Text(field)),
    }
}

fn parse_image_urls(value: &Value) -> Result<Vec<String>, ValidationError> {
    let Value::Array(items) = value else {
        return Err(ValidationError::ImageUrls);
    };

    items
        .iter()
        .map(|item| item.as_str().map(str::to_string).ok_or(ValidationError::ImageUrls))
        .collect()
}
