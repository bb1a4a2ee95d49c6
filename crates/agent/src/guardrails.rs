use serde_json::{Map, Value};

use catalogbot_core::domain::conversation::{PendingAction, ToolCallRecord};

use crate::llm::RequestedCall;
use crate::tools::{ToolRegistry, CREATE_PRODUCT, QUERY_INVENTORY, UPDATE_PRODUCT};

pub const DEFAULT_MAX_CALLS_PER_ROUND: usize = 4;

#[derive(Clone, Debug, PartialEq)]
pub enum GuardrailDecision {
    /// Every requested call is well formed; arguments are parsed.
    Allow(Vec<ToolCallRecord>),
    /// Nothing may be dispatched this round. The seller is asked to clarify.
    Clarify { reason_code: &'static str, user_message: String, pending: Option<PendingAction> },
}

/// Checks model-requested actions before any of them touch the catalog.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuardrailPolicy {
    pub max_calls_per_round: usize,
}

impl Default for GuardrailPolicy {
    fn default() -> Self {
        Self { max_calls_per_round: DEFAULT_MAX_CALLS_PER_ROUND }
    }
}

impl GuardrailPolicy {
    /// The whole batch is rejected if any single call fails a check.
    pub fn review(&self, calls: &[RequestedCall], registry: &ToolRegistry) -> GuardrailDecision {
        if calls.len() > self.max_calls_per_round {
            return GuardrailDecision::Clarify {
                reason_code: "too_many_actions",
                user_message: "That's a lot at once. Could we take it one product at a time?"
                    .to_string(),
                pending: None,
            };
        }

        let mut accepted = Vec::with_capacity(calls.len());
        for call in calls {
            let Some(tool) = registry.get(&call.name) else {
                return GuardrailDecision::Clarify {
                    reason_code: "unknown_action",
                    user_message: "I'm not sure what you'd like me to do. I can add, update, list or search your products.".to_string(),
                    pending: None,
                };
            };

            let Some(arguments) = parse_arguments(&call.raw_arguments) else {
                return GuardrailDecision::Clarify {
                    reason_code: "unparseable_arguments",
                    user_message: "I didn't quite catch the product details. Could you send them again?"
                        .to_string(),
                    pending: Some(PendingAction {
                        action: call.name.clone(),
                        arguments: Map::new(),
                        missing_fields: Vec::new(),
                    }),
                };
            };

            let missing_fields = tool
                .required_arguments()
                .iter()
                .filter(|field| arguments.get(**field).map_or(true, Value::is_null))
                .map(|field| field.to_string())
                .collect::<Vec<_>>();
            if !missing_fields.is_empty() {
                return GuardrailDecision::Clarify {
                    reason_code: "missing_arguments",
                    user_message: clarification_for(&call.name, &missing_fields),
                    pending: Some(PendingAction {
                        action: call.name.clone(),
                        arguments,
                        missing_fields,
                    }),
                };
            }

            accepted.push(ToolCallRecord {
                id: call.id.clone(),
                name: call.name.clone(),
                arguments: Value::Object(arguments),
            });
        }

        GuardrailDecision::Allow(accepted)
    }
}

/// Empty argument text counts as `{}`; anything that is not a JSON object is rejected.
fn parse_arguments(raw: &str) -> Option<Map<String, Value>> {
    if raw.trim().is_empty() {
        return Some(Map::new());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(arguments)) => Some(arguments),
        _ => None,
    }
}

fn clarification_for(action: &str, missing_fields: &[String]) -> String {
    let fields = missing_fields.iter().map(|field| field.replace('_', " ")).collect::<Vec<_>>();
    let listed = match fields.as_slice() {
        [single] => single.clone(),
        [head @ .., last] => format!("{} and {last}", head.join(", ")),
        [] => String::new(),
    };

    match action {
        CREATE_PRODUCT => format!("Almost there! What's the {listed} for this product?"),
        UPDATE_PRODUCT => format!("Which product should I update? Please share the {listed}."),
        QUERY_INVENTORY => "What should I search for?".to_string(),
        _ => format!("I need the {listed} to do that."),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use catalogbot_db::repositories::InMemoryProductRepository;

    use super::{GuardrailDecision, GuardrailPolicy};
    use crate::catalog::CatalogService;
    use crate::llm::RequestedCall;
    use crate::tools::ToolRegistry;

    fn registry() -> ToolRegistry {
        ToolRegistry::catalog(Arc::new(CatalogService::new(Arc::new(
            InMemoryProductRepository::default(),
        ))))
    }

    fn call(name: &str, raw_arguments: &str) -> RequestedCall {
        RequestedCall {
            id: "call_1".to_string(),
            name: name.to_string(),
            raw_arguments: raw_arguments.to_string(),
        }
    }

    #[test]
    fn well_formed_call_is_allowed_with_parsed_arguments() {
        let decision = GuardrailPolicy::default()
            .review(&[call("list_products", r#"{"limit": 5}"#)], &registry());

        let GuardrailDecision::Allow(records) = decision else {
            panic!("expected allow");
        };
        assert_eq!(records[0].arguments, json!({"limit": 5}));
    }

    #[test]
    fn missing_price_yields_pending_action() {
        let raw = r#"{"title": "Nike shoes", "category": "fashion", "quantity": 3, "condition": "new", "price": null}"#;
        let decision = GuardrailPolicy::default().review(&[call("create_product", raw)], &registry());

        let GuardrailDecision::Clarify { reason_code, user_message, pending } = decision else {
            panic!("expected clarify");
        };
        assert_eq!(reason_code, "missing_arguments");
        assert_eq!(user_message, "Almost there! What's the price for this product?");
        let pending = pending.expect("pending action");
        assert_eq!(pending.action, "create_product");
        assert_eq!(pending.missing_fields, ["price"]);
        assert_eq!(pending.arguments.get("title"), Some(&json!("Nike shoes")));
    }

    #[test]
    fn unknown_action_and_bad_json_are_never_allowed() {
        let policy = GuardrailPolicy::default();
        let registry = registry();

        let unknown = policy.review(&[call("delete_everything", "{}")], &registry);
        let broken = policy.review(&[call("query_inventory", "{\"search_term\": ")], &registry);
        let array = policy.review(&[call("list_products", "[1, 2]")], &registry);

        assert!(matches!(unknown, GuardrailDecision::Clarify { reason_code: "unknown_action", pending: None, .. }));
        assert!(matches!(broken, GuardrailDecision::Clarify { reason_code: "unparseable_arguments", pending: Some(_), .. }));
        assert!(matches!(array, GuardrailDecision::Clarify { reason_code: "unparseable_arguments", .. }));
    }

    #[test]
    fn one_bad_call_blocks_the_whole_batch() {
        let decision = GuardrailPolicy::default().review(
            &[call("list_products", "{}"), call("update_product", r#"{"updates": {"price": 10}}"#)],
            &registry(),
        );

        assert!(matches!(decision, GuardrailDecision::Clarify { reason_code: "missing_arguments", .. }));
    }

    #[test]
    fn oversized_batch_is_rejected() {
        let policy = GuardrailPolicy { max_calls_per_round: 1 };
        let decision =
            policy.review(&[call("list_products", "{}"), call("list_products", "{}")], &registry());

        assert!(matches!(decision, GuardrailDecision::Clarify { reason_code: "too_many_actions", .. }));
    }
}
