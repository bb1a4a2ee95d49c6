use std::env;
use std::sync::{Arc, Mutex, OnceLock};

use catalogbot_agent::catalog::CatalogService;
use catalogbot_agent::guardrails::GuardrailPolicy;
use catalogbot_agent::tools::ToolRegistry;
use catalogbot_agent::{AgentRuntime, ConversationEngine, ModelResponse, RuntimeSettings, ScriptedLlmClient};
use catalogbot_cli::commands::chat::{run_session, SessionSummary, FAILURE_REPLY};
use catalogbot_cli::commands::{config, doctor, migrate};
use catalogbot_db::repositories::{
    InMemoryConversationStore, InMemoryProductRepository, InMemorySellerRepository, ProductRepository,
    SellerRepository,
};
use serde_json::{json, Value};

const WHATSAPP_ENV: [(&str, &str); 3] = [
    ("CATALOGBOT_WHATSAPP_ACCESS_TOKEN", "EAAGm0PX4ZCpsBAKZCg9s"),
    ("CATALOGBOT_WHATSAPP_PHONE_NUMBER_ID", "106540352242922"),
    ("CATALOGBOT_WHATSAPP_VERIFY_TOKEN", "verify-me"),
];

#[test]
fn migrate_returns_success_with_valid_env() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}", dir.path().join("catalog.db").display());
    with_env(&[("CATALOGBOT_DATABASE_URL", url.as_str())], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
    assert!(dir.path().join("catalog.db").exists());
}

#[test]
fn migrate_reports_config_failure_with_exit_code_2() {
    with_env(&[("CATALOGBOT_SERVER_PORT", "eighty")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn doctor_fails_without_whatsapp_credentials() {
    with_env(
        &[("CATALOGBOT_DATABASE_URL", "sqlite::memory:"), ("CATALOGBOT_LLM_PROVIDER", "ollama")],
        || {
            let result = doctor::run(true);
            assert_eq!(result.exit_code, 1);

            let report: Value = serde_json::from_str(&result.output).expect("doctor json");
            assert_eq!(report["overall_status"], "fail");
            let whatsapp = check(&report, "whatsapp_credentials");
            assert_eq!(whatsapp["status"], "fail");
            assert!(whatsapp["details"].as_str().unwrap_or_default().contains("whatsapp.access_token"));
            assert_eq!(check(&report, "database_connectivity")["status"], "pass");
        },
    );
}

#[test]
fn doctor_passes_with_full_env() {
    let mut vars = WHATSAPP_ENV.to_vec();
    vars.push(("CATALOGBOT_DATABASE_URL", "sqlite::memory:"));
    vars.push(("CATALOGBOT_LLM_PROVIDER", "ollama"));
    with_env(&vars, || {
        let result = doctor::run(false);
        assert_eq!(result.exit_code, 0, "{}", result.output);
        assert!(result.output.starts_with("doctor: all readiness checks passed"));
        assert!(result.output.contains("- [ok] llm_credentials: ollama via http://localhost:11434/v1"));
    });
}

#[test]
fn config_redacts_secrets_and_attributes_sources() {
    with_env(&WHATSAPP_ENV, || {
        let output = config::run();

        assert!(!output.contains("EAAGm0PX4ZCpsBAKZCg9s"));
        assert!(!output.contains("verify-me"));
        assert!(output.contains(
            "- whatsapp.access_token = EAAG*** (source: env (CATALOGBOT_WHATSAPP_ACCESS_TOKEN))"
        ));
        assert!(output.contains("- whatsapp.verify_token = <redacted>"));
        assert!(output.contains("- server.port = 8000 (source: default)"));
    });
}

#[tokio::test]
async fn chat_session_creates_product_and_attaches_images() {
    let llm = Arc::new(ScriptedLlmClient::new([
        ModelResponse::tool_call(
            "create_product",
            json!({
                "title": "Red Sneakers",
                "price": 15000,
                "category": "fashion",
                "quantity": 2,
                "condition": "new"
            }),
        ),
        ModelResponse::text("Added Red Sneakers at ₦15,000."),
    ]));
    let products = Arc::new(InMemoryProductRepository::default());
    let engine = ConversationEngine::new(
        llm.clone(),
        Arc::new(ToolRegistry::catalog(Arc::new(CatalogService::new(products.clone())))),
        GuardrailPolicy::default(),
        2,
    );
    let sellers = Arc::new(InMemorySellerRepository::default());
    let agent = AgentRuntime::new(
        engine,
        Arc::new(InMemoryConversationStore::default()),
        sellers.clone(),
        RuntimeSettings::default(),
    );
    let script = "image https://cdn.example.com/sneakers.jpg\n\
                  add red sneakers 15000 fashion 2 new\n\
                  what do I have?\n\
                  quit\n\
                  never read\n";
    let mut output = Vec::new();

    let summary = run_session(&agent, "2348012345678", script.as_bytes(), &mut output)
        .await
        .expect("session");

    let transcript = String::from_utf8(output).expect("utf8");
    assert_eq!(summary, SessionSummary { turns: 2, failures: 1 });
    assert!(transcript.contains("(image attached to your next message, 1 queued)"));
    assert!(transcript.contains("bot> Added Red Sneakers at ₦15,000."));
    assert!(transcript.contains(FAILURE_REPLY));

    let requests = llm.requests().await;
    let first_user_message = &requests[0].messages.last().expect("user message").content;
    assert!(first_user_message.contains("https://cdn.example.com/sneakers.jpg"));
    let seller = sellers.find_by_contact("2348012345678").await.expect("lookup").expect("seller created");
    assert_eq!(products.count(&seller.id).await.expect("count"), 1);
}

fn check<'a>(report: &'a Value, name: &str) -> &'a Value {
    report["checks"]
        .as_array()
        .and_then(|checks| checks.iter().find(|check| check["name"] == name))
        .expect("check present")
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "CATALOGBOT_DATABASE_URL",
        "CATALOGBOT_DATABASE_MAX_CONNECTIONS",
        "CATALOGBOT_DATABASE_TIMEOUT_SECS",
        "CATALOGBOT_WHATSAPP_ACCESS_TOKEN",
        "CATALOGBOT_WHATSAPP_PHONE_NUMBER_ID",
        "CATALOGBOT_WHATSAPP_VERIFY_TOKEN",
        "CATALOGBOT_LLM_PROVIDER",
        "CATALOGBOT_LLM_API_KEY",
        "CATALOGBOT_LLM_BASE_URL",
        "CATALOGBOT_LLM_MODEL",
        "CATALOGBOT_SERVER_PORT",
        "CATALOGBOT_MEDIA_BACKEND",
        "CATALOGBOT_LOGGING_LEVEL",
        "CATALOGBOT_LOGGING_FORMAT",
        "CATALOGBOT_LOG_LEVEL",
        "CATALOGBOT_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
