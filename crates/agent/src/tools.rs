use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use catalogbot_core::catalog::outcome::ActionOutcome;
use catalogbot_core::domain::product::{
    ProductId, CATEGORY_NAMES, CONDITION_NAMES, REQUIRED_CREATE_FIELDS,
};
use catalogbot_core::domain::seller::SellerId;

use crate::catalog::CatalogService;
use crate::llm::ToolSpec;

pub const CREATE_PRODUCT: &str = "create_product";
pub const QUERY_INVENTORY: &str = "query_inventory";
pub const UPDATE_PRODUCT: &str = "update_product";
pub const LIST_PRODUCTS: &str = "list_products";

/// A catalog action the model may request. Arguments reaching `execute` have
/// already passed the guardrail checks for name and required keys, but their
/// values are still untrusted.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn parameters(&self) -> Value;
    fn required_arguments(&self) -> &'static [&'static str];
    async fn execute(&self, seller_id: &SellerId, arguments: &Map<String, Value>) -> ActionOutcome;
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<&'static str, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// The four catalog actions, all backed by the same service.
    pub fn catalog(service: Arc<CatalogService>) -> Self {
        let mut registry = Self::default();
        registry.register(CreateProductTool { service: service.clone() });
        registry.register(QueryInventoryTool { service: service.clone() });
        registry.register(UpdateProductTool { service: service.clone() });
        registry.register(ListProductsTool { service });
        registry
    }

    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.tools.insert(tool.name(), Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools
            .values()
            .map(|tool| ToolSpec {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters(),
            })
            .collect()
    }
}

pub struct CreateProductTool {
    service: Arc<CatalogService>,
}

#[async_trait]
impl Tool for CreateProductTool {
    fn name(&self) -> &'static str {
        CREATE_PRODUCT
    }

    fn description(&self) -> &'static str {
        "Create a new product in the seller's catalog"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "title": {"type": "string", "description": "Product name"},
                "price": {"type": "number", "description": "Price in Naira"},
                "category": {"type": "string", "enum": CATEGORY_NAMES},
                "quantity": {"type": "integer", "description": "Stock quantity"},
                "condition": {"type": "string", "enum": CONDITION_NAMES},
                "description": {"type": "string", "description": "Product description"},
                "size": {"type": "string", "description": "Size if applicable"},
                "brand": {"type": "string", "description": "Brand name"},
                "image_urls": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "List of image URLs"
                }
            },
            "required": self.required_arguments(),
        })
    }

    fn required_arguments(&self) -> &'static [&'static str] {
        REQUIRED_CREATE_FIELDS
    }

    async fn execute(&self, seller_id: &SellerId, arguments: &Map<String, Value>) -> ActionOutcome {
        self.service.create_product(seller_id, arguments).await
    }
}

pub struct QueryInventoryTool {
    service: Arc<CatalogService>,
}

#[async_trait]
impl Tool for QueryInventoryTool {
    fn name(&self) -> &'static str {
        QUERY_INVENTORY
    }

    fn description(&self) -> &'static str {
        "Search the seller's products by title"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "search_term": {"type": "string", "description": "Text to search for in product titles"}
            },
            "required": self.required_arguments(),
        })
    }

    fn required_arguments(&self) -> &'static [&'static str] {
        &["search_term"]
    }

    async fn execute(&self, seller_id: &SellerId, arguments: &Map<String, Value>) -> ActionOutcome {
        match arguments.get("search_term") {
            Some(Value::String(term)) => self.service.query_inventory(seller_id, term).await,
            Some(Value::Number(number)) => {
                self.service.query_inventory(seller_id, &number.to_string()).await
            }
            _ => ActionOutcome::failure("search_term must be text"),
        }
    }
}

pub struct UpdateProductTool {
    service: Arc<CatalogService>,
}

#[async_trait]
impl Tool for UpdateProductTool {
    fn name(&self) -> &'static str {
        UPDATE_PRODUCT
    }

    fn description(&self) -> &'static str {
        "Update fields of an existing product owned by the seller"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "product_id": {"type": "string", "description": "Product ID to update"},
                "updates": {"type": "object", "description": "Fields to update"}
            },
            "required": self.required_arguments(),
        })
    }

    fn required_arguments(&self) -> &'static [&'static str] {
        &["product_id", "updates"]
    }

    async fn execute(&self, seller_id: &SellerId, arguments: &Map<String, Value>) -> ActionOutcome {
        let Some(product_id) = arguments.get("product_id").and_then(Value::as_str) else {
            return ActionOutcome::failure("product_id must be text");
        };
        let Some(updates) = arguments.get("updates").and_then(Value::as_object) else {
            return ActionOutcome::failure("updates must be an object of fields to change");
        };

        self.service.update_product(seller_id, &ProductId(product_id.trim().to_string()), updates).await
    }
}

pub struct ListProductsTool {
    service: Arc<CatalogService>,
}

#[async_trait]
impl Tool for ListProductsTool {
    fn name(&self) -> &'static str {
        LIST_PRODUCTS
    }

    fn description(&self) -> &'static str {
        "List the seller's products"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "limit": {"type": "integer", "description": "Max products to return", "default": 10}
            },
        })
    }

    fn required_arguments(&self) -> &'static [&'static str] {
        &[]
    }

    async fn execute(&self, seller_id: &SellerId, arguments: &Map<String, Value>) -> ActionOutcome {
        let limit = match arguments.get("limit") {
            None | Some(Value::Null) => None,
            Some(value) => match value.as_i64().or_else(|| value.as_f64().map(|limit| limit as i64)) {
                Some(limit) => Some(limit),
                None => return ActionOutcome::failure("limit must be a number"),
            },
        };

        self.service.list_products(seller_id, limit).await
    }
}
