use tera::{Context, Tera};

use catalogbot_core::domain::conversation::PendingAction;
use catalogbot_core::domain::product::{CATEGORY_NAMES, CONDITION_NAMES};

const SYSTEM_TEMPLATE: &str = r#"You are a friendly catalog assistant helping {{ seller_name }} manage the products they sell over WhatsApp.

You can create products, update products, list products and search the inventory using the provided functions.
Only call a function once you have every required field. If something is missing, ask for it in one short question.
Never invent prices, quantities or product ids. Prices are in Naira.

Valid categories: {{ categories }}.
Valid conditions: {{ conditions }}.
{% if pending %}
You were in the middle of `{{ pending.action }}` and still need: {{ pending.missing | join(sep=", ") }}.
Details collected so far: {{ pending.arguments }}.
Combine them with the seller's next answer before calling the function again.
{% endif %}
When a function reports an error, explain it to the seller in plain words and ask how to proceed.
Keep replies short; they are read on a phone."#;

#[derive(Debug, thiserror::Error)]
#[error("system prompt could not be rendered: {0}")]
pub struct PromptError(#[from] tera::Error);

pub fn render_system_prompt(
    seller_name: &str,
    pending: Option<&PendingAction>,
) -> Result<String, PromptError> {
    let mut context = Context::new();
    context.insert("seller_name", seller_name);
    context.insert("categories", &CATEGORY_NAMES.join(", "));
    context.insert("conditions", &CONDITION_NAMES.join(", "));

    if let Some(pending) = pending {
        let arguments = serde_json::Value::Object(pending.arguments.clone()).to_string();
        context.insert(
            "pending",
            &serde_json::json!({
                "action": pending.action,
                "missing": pending.missing_fields,
                "arguments": arguments,
            }),
        );
    }

    Ok(Tera::one_off(SYSTEM_TEMPLATE, &context, false)?)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use catalogbot_core::domain::conversation::PendingAction;

    use super::render_system_prompt;

    #[test]
    fn prompt_lists_categories_and_seller() {
        let prompt = render_system_prompt("Ada", None).expect("render");

        assert!(prompt.contains("helping Ada manage"));
        assert!(prompt.contains(
            "Valid categories: fashion, electronics, home, beauty, sports, food, books, other."
        ));
        assert!(prompt.contains("Valid conditions: new, used, refurbished."));
        assert!(!prompt.contains("middle of"));
    }

    #[test]
    fn prompt_carries_pending_action() {
        let pending = PendingAction {
            action: "create_product".to_string(),
            arguments: json!({"title": "Nike shoes"}).as_object().cloned().expect("object"),
            missing_fields: vec!["price".to_string()],
        };

        let prompt = render_system_prompt("Seller", Some(&pending)).expect("render");

        assert!(prompt.contains("middle of `create_product` and still need: price."));
        assert!(prompt.contains(r#"{"title":"Nike shoes"}"#));
    }
}
