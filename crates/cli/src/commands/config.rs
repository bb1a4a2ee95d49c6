use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use catalogbot_core::config::{resolve_config_path, AppConfig, LoadOptions};
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

struct Field {
    key: &'static str,
    env_key: &'static str,
    value: String,
}

impl Field {
    fn new(key: &'static str, env_key: &'static str, value: impl Into<String>) -> Self {
        Self { key, env_key, value: value.into() }
    }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = resolve_config_path(None);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in effective_fields(&config) {
        let source = field_source(
            field.key,
            field.env_key,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(format!("- {} = {} (source: {source})", field.key, field.value));
    }

    lines.join("\n")
}

fn effective_fields(config: &AppConfig) -> Vec<Field> {
    let unset = || "<unset>".to_string();
    vec![
        Field::new("database.url", "CATALOGBOT_DATABASE_URL", &config.database.url),
        Field::new(
            "database.max_connections",
            "CATALOGBOT_DATABASE_MAX_CONNECTIONS",
            config.database.max_connections.to_string(),
        ),
        Field::new(
            "database.timeout_secs",
            "CATALOGBOT_DATABASE_TIMEOUT_SECS",
            config.database.timeout_secs.to_string(),
        ),
        Field::new(
            "whatsapp.access_token",
            "CATALOGBOT_WHATSAPP_ACCESS_TOKEN",
            redact_secret(&config.whatsapp.access_token),
        ),
        Field::new(
            "whatsapp.phone_number_id",
            "CATALOGBOT_WHATSAPP_PHONE_NUMBER_ID",
            if config.whatsapp.phone_number_id.is_empty() {
                unset()
            } else {
                config.whatsapp.phone_number_id.clone()
            },
        ),
        Field::new(
            "whatsapp.verify_token",
            "CATALOGBOT_WHATSAPP_VERIFY_TOKEN",
            redact_secret(&config.whatsapp.verify_token),
        ),
        Field::new("whatsapp.api_base_url", "CATALOGBOT_WHATSAPP_API_BASE_URL", &config.whatsapp.api_base_url),
        Field::new("llm.provider", "CATALOGBOT_LLM_PROVIDER", config.llm.provider.as_str()),
        Field::new("llm.model", "CATALOGBOT_LLM_MODEL", &config.llm.model),
        Field::new("llm.base_url", "CATALOGBOT_LLM_BASE_URL", config.llm.effective_base_url()),
        Field::new(
            "llm.api_key",
            "CATALOGBOT_LLM_API_KEY",
            config.llm.api_key.as_ref().map(redact_secret).unwrap_or_else(unset),
        ),
        Field::new("llm.timeout_secs", "CATALOGBOT_LLM_TIMEOUT_SECS", config.llm.timeout_secs.to_string()),
        Field::new("llm.max_retries", "CATALOGBOT_LLM_MAX_RETRIES", config.llm.max_retries.to_string()),
        Field::new("server.bind_address", "CATALOGBOT_SERVER_BIND_ADDRESS", &config.server.bind_address),
        Field::new("server.port", "CATALOGBOT_SERVER_PORT", config.server.port.to_string()),
        Field::new(
            "server.graceful_shutdown_secs",
            "CATALOGBOT_SERVER_GRACEFUL_SHUTDOWN_SECS",
            config.server.graceful_shutdown_secs.to_string(),
        ),
        Field::new(
            "conversation.ttl_secs",
            "CATALOGBOT_CONVERSATION_TTL_SECS",
            config.conversation.ttl_secs.to_string(),
        ),
        Field::new(
            "conversation.max_history_messages",
            "CATALOGBOT_CONVERSATION_MAX_HISTORY_MESSAGES",
            config.conversation.max_history_messages.to_string(),
        ),
        Field::new(
            "agent.max_dispatch_rounds",
            "CATALOGBOT_AGENT_MAX_DISPATCH_ROUNDS",
            config.agent.max_dispatch_rounds.to_string(),
        ),
        Field::new("media.backend", "CATALOGBOT_MEDIA_BACKEND", config.media.backend.as_str()),
        Field::new("media.local_dir", "CATALOGBOT_MEDIA_LOCAL_DIR", config.media.local_dir.display().to_string()),
        Field::new("media.public_base_url", "CATALOGBOT_MEDIA_PUBLIC_BASE_URL", &config.media.public_base_url),
        Field::new(
            "media.storage_url",
            "CATALOGBOT_MEDIA_STORAGE_URL",
            config.media.storage_url.clone().unwrap_or_else(unset),
        ),
        Field::new(
            "media.storage_key",
            "CATALOGBOT_MEDIA_STORAGE_KEY",
            config.media.storage_key.as_ref().map(redact_secret).unwrap_or_else(unset),
        ),
        Field::new("media.bucket", "CATALOGBOT_MEDIA_BUCKET", &config.media.bucket),
        Field::new("media.timeout_secs", "CATALOGBOT_MEDIA_TIMEOUT_SECS", config.media.timeout_secs.to_string()),
        Field::new("logging.level", "CATALOGBOT_LOGGING_LEVEL", &config.logging.level),
        Field::new("logging.format", "CATALOGBOT_LOGGING_FORMAT", format!("{:?}", config.logging.format).to_lowercase()),
    ]
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("config file"));
            return format!("file ({})", file_path.display());
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

/// Keeps just enough of a secret to tell two of them apart.
fn redact_secret(secret: &SecretString) -> String {
    let trimmed = secret.expose_secret().trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    let prefix: String = trimmed.chars().take(4).collect();
    if trimmed.chars().count() > 12 {
        format!("{prefix}***")
    } else {
        "<redacted>".to_string()
    }
}
