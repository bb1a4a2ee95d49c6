use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Uniform result of a catalog action, serialized as the tool result the
/// model reads back: `{"success": bool, "error"?: String, ...payload}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl ActionOutcome {
    /// `payload` must be a JSON object; any other value is dropped.
    pub fn ok(payload: Value) -> Self {
        let payload = match payload {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self { success: true, error: None, payload }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self { success: false, error: Some(error.into()), payload: Map::new() }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    pub fn to_json_string(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"success":false,"error":"failed to encode action result"}"#.to_string()
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::ActionOutcome;

    #[test]
    fn success_flattens_payload() {
        let outcome = ActionOutcome::ok(json!({"product_id": "PROD-1", "message": "ok"}));
        let encoded: Value = serde_json::from_str(&outcome.to_json_string()).expect("json");

        assert_eq!(encoded, json!({"success": true, "product_id": "PROD-1", "message": "ok"}));
    }

    #[test]
    fn failure_carries_error_only() {
        let outcome = ActionOutcome::failure("Price must be greater than 0");
        let encoded: Value = serde_json::from_str(&outcome.to_json_string()).expect("json");

        assert_eq!(encoded, json!({"success": false, "error": "Price must be greater than 0"}));
    }
}
