use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "catalogbot.toml";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub whatsapp: WhatsAppConfig,
    pub llm: LlmConfig,
    pub server: ServerConfig,
    pub conversation: ConversationConfig,
    pub agent: AgentConfig,
    pub media: MediaConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct WhatsAppConfig {
    pub access_token: SecretString,
    pub phone_number_id: String,
    pub verify_token: SecretString,
    pub api_base_url: String,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ConversationConfig {
    pub ttl_secs: u64,
    pub max_history_messages: usize,
}

#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub max_dispatch_rounds: u32,
}

#[derive(Clone, Debug)]
pub struct MediaConfig {
    pub backend: MediaBackend,
    pub local_dir: PathBuf,
    pub public_base_url: String,
    pub storage_url: Option<String>,
    pub storage_key: Option<SecretString>,
    pub bucket: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    OpenRouter,
    OpenAi,
    Ollama,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenRouter => "openrouter",
            Self::OpenAi => "openai",
            Self::Ollama => "ollama",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenRouter => "https://openrouter.ai/api/v1",
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Ollama => "http://localhost:11434/v1",
        }
    }

    pub fn requires_api_key(&self) -> bool {
        !matches!(self, Self::Ollama)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaBackend {
    Local,
    ObjectStorage,
}

impl MediaBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::ObjectStorage => "object_storage",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub llm_base_url: Option<String>,
    pub server_port: Option<u16>,
    pub whatsapp_access_token: Option<String>,
    pub whatsapp_phone_number_id: Option<String>,
    pub whatsapp_verify_token: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://catalogbot.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            whatsapp: WhatsAppConfig {
                access_token: String::new().into(),
                phone_number_id: String::new(),
                verify_token: String::new().into(),
                api_base_url: "https://graph.facebook.com/v18.0".to_string(),
            },
            llm: LlmConfig {
                provider: LlmProvider::OpenRouter,
                api_key: None,
                base_url: None,
                model: "meta-llama/llama-3.1-70b-instruct".to_string(),
                timeout_secs: 60,
                max_retries: 2,
            },
            server: ServerConfig {
                bind_address: "0.0.0.0".to_string(),
                port: 8000,
                graceful_shutdown_secs: 15,
            },
            conversation: ConversationConfig { ttl_secs: 3600, max_history_messages: 40 },
            agent: AgentConfig { max_dispatch_rounds: 1 },
            media: MediaConfig {
                backend: MediaBackend::Local,
                local_dir: PathBuf::from("media"),
                public_base_url: "http://localhost:8000/media".to_string(),
                storage_url: None,
                storage_key: None,
                bucket: "product-images".to_string(),
                timeout_secs: 60,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openrouter" => Ok(Self::OpenRouter),
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openrouter|openai|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for MediaBackend {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "object_storage" => Ok(Self::ObjectStorage),
            other => Err(ConfigError::Validation(format!(
                "unsupported media backend `{other}` (expected local|object_storage)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl LlmConfig {
    pub fn effective_base_url(&self) -> String {
        self.base_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .unwrap_or(self.provider.default_base_url())
            .trim_end_matches('/')
            .to_string()
    }

    /// Hosted providers cannot be called without a key; local ones can.
    pub fn require_credentials(&self) -> Result<(), ConfigError> {
        if !self.provider.requires_api_key() {
            return Ok(());
        }

        let missing = self
            .api_key
            .as_ref()
            .map(|value| value.expose_secret().trim().is_empty())
            .unwrap_or(true);
        if missing {
            return Err(ConfigError::Validation(format!(
                "llm.api_key is required for the {} provider (set CATALOGBOT_LLM_API_KEY)",
                self.provider.as_str()
            )));
        }

        Ok(())
    }
}

impl WhatsAppConfig {
    /// The webhook server cannot run without these; the CLI can.
    pub fn require_credentials(&self) -> Result<(), ConfigError> {
        if self.access_token.expose_secret().trim().is_empty() {
            return Err(ConfigError::Validation(
                "whatsapp.access_token is required. Get it from Meta for Developers > Your App > WhatsApp > API Setup".to_string(),
            ));
        }
        if self.phone_number_id.trim().is_empty() {
            return Err(ConfigError::Validation(
                "whatsapp.phone_number_id is required. It is listed under WhatsApp > API Setup next to the test number".to_string(),
            ));
        }
        if self.verify_token.expose_secret().trim().is_empty() {
            return Err(ConfigError::Validation(
                "whatsapp.verify_token is required to answer the webhook verification handshake"
                    .to_string(),
            ));
        }

        Ok(())
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(whatsapp) = patch.whatsapp {
            if let Some(access_token) = whatsapp.access_token {
                self.whatsapp.access_token = secret_value(access_token);
            }
            if let Some(phone_number_id) = whatsapp.phone_number_id {
                self.whatsapp.phone_number_id = phone_number_id;
            }
            if let Some(verify_token) = whatsapp.verify_token {
                self.whatsapp.verify_token = secret_value(verify_token);
            }
            if let Some(api_base_url) = whatsapp.api_base_url {
                self.whatsapp.api_base_url = api_base_url;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(api_key) = llm.api_key {
                self.llm.api_key = Some(secret_value(api_key));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(conversation) = patch.conversation {
            if let Some(ttl_secs) = conversation.ttl_secs {
                self.conversation.ttl_secs = ttl_secs;
            }
            if let Some(max_history_messages) = conversation.max_history_messages {
                self.conversation.max_history_messages = max_history_messages;
            }
        }

        if let Some(agent) = patch.agent {
            if let Some(max_dispatch_rounds) = agent.max_dispatch_rounds {
                self.agent.max_dispatch_rounds = max_dispatch_rounds;
            }
        }

        if let Some(media) = patch.media {
            if let Some(backend) = media.backend {
                self.media.backend = backend;
            }
            if let Some(local_dir) = media.local_dir {
                self.media.local_dir = local_dir;
            }
            if let Some(public_base_url) = media.public_base_url {
                self.media.public_base_url = public_base_url;
            }
            if let Some(storage_url) = media.storage_url {
                self.media.storage_url = Some(storage_url);
            }
            if let Some(storage_key) = media.storage_key {
                self.media.storage_key = Some(secret_value(storage_key));
            }
            if let Some(bucket) = media.bucket {
                self.media.bucket = bucket;
            }
            if let Some(timeout_secs) = media.timeout_secs {
                self.media.timeout_secs = timeout_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("CATALOGBOT_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("CATALOGBOT_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("CATALOGBOT_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("CATALOGBOT_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("CATALOGBOT_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("CATALOGBOT_WHATSAPP_ACCESS_TOKEN") {
            self.whatsapp.access_token = secret_value(value);
        }
        if let Some(value) = read_env("CATALOGBOT_WHATSAPP_PHONE_NUMBER_ID") {
            self.whatsapp.phone_number_id = value;
        }
        if let Some(value) = read_env("CATALOGBOT_WHATSAPP_VERIFY_TOKEN") {
            self.whatsapp.verify_token = secret_value(value);
        }
        if let Some(value) = read_env("CATALOGBOT_WHATSAPP_API_BASE_URL") {
            self.whatsapp.api_base_url = value;
        }

        if let Some(value) = read_env("CATALOGBOT_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("CATALOGBOT_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("CATALOGBOT_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("CATALOGBOT_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("CATALOGBOT_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("CATALOGBOT_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("CATALOGBOT_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_u32("CATALOGBOT_LLM_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("CATALOGBOT_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("CATALOGBOT_SERVER_PORT") {
            self.server.port = parse_u16("CATALOGBOT_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("CATALOGBOT_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("CATALOGBOT_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("CATALOGBOT_CONVERSATION_TTL_SECS") {
            self.conversation.ttl_secs = parse_u64("CATALOGBOT_CONVERSATION_TTL_SECS", &value)?;
        }
        if let Some(value) = read_env("CATALOGBOT_CONVERSATION_MAX_HISTORY_MESSAGES") {
            self.conversation.max_history_messages =
                parse_u32("CATALOGBOT_CONVERSATION_MAX_HISTORY_MESSAGES", &value)? as usize;
        }

        if let Some(value) = read_env("CATALOGBOT_AGENT_MAX_DISPATCH_ROUNDS") {
            self.agent.max_dispatch_rounds =
                parse_u32("CATALOGBOT_AGENT_MAX_DISPATCH_ROUNDS", &value)?;
        }

        if let Some(value) = read_env("CATALOGBOT_MEDIA_BACKEND") {
            self.media.backend = value.parse()?;
        }
        if let Some(value) = read_env("CATALOGBOT_MEDIA_LOCAL_DIR") {
            self.media.local_dir = PathBuf::from(value);
        }
        if let Some(value) = read_env("CATALOGBOT_MEDIA_PUBLIC_BASE_URL") {
            self.media.public_base_url = value;
        }
        if let Some(value) = read_env("CATALOGBOT_MEDIA_STORAGE_URL") {
            self.media.storage_url = Some(value);
        }
        if let Some(value) = read_env("CATALOGBOT_MEDIA_STORAGE_KEY") {
            self.media.storage_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("CATALOGBOT_MEDIA_BUCKET") {
            self.media.bucket = value;
        }
        if let Some(value) = read_env("CATALOGBOT_MEDIA_TIMEOUT_SECS") {
            self.media.timeout_secs = parse_u64("CATALOGBOT_MEDIA_TIMEOUT_SECS", &value)?;
        }

        let log_level =
            read_env("CATALOGBOT_LOGGING_LEVEL").or_else(|| read_env("CATALOGBOT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("CATALOGBOT_LOGGING_FORMAT").or_else(|| read_env("CATALOGBOT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(llm_base_url) = overrides.llm_base_url {
            self.llm.base_url = Some(llm_base_url);
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(access_token) = overrides.whatsapp_access_token {
            self.whatsapp.access_token = secret_value(access_token);
        }
        if let Some(phone_number_id) = overrides.whatsapp_phone_number_id {
            self.whatsapp.phone_number_id = phone_number_id;
        }
        if let Some(verify_token) = overrides.whatsapp_verify_token {
            self.whatsapp.verify_token = secret_value(verify_token);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_whatsapp(&self.whatsapp)?;
        validate_llm(&self.llm)?;
        validate_server(&self.server)?;
        validate_conversation(&self.conversation, &self.agent)?;
        validate_media(&self.media)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

/// The file `AppConfig::load` would read: the explicit path if it exists,
/// otherwise `catalogbot.toml` then `config/catalogbot.toml`.
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(DEFAULT_CONFIG_FILE), Path::new("config").join(DEFAULT_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_whatsapp(whatsapp: &WhatsAppConfig) -> Result<(), ConfigError> {
    if !is_http_url(whatsapp.api_base_url.trim()) {
        return Err(ConfigError::Validation(
            "whatsapp.api_base_url must start with http:// or https://".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    if let Some(base_url) = llm.base_url.as_deref().map(str::trim).filter(|url| !url.is_empty()) {
        if !is_http_url(base_url) {
            return Err(ConfigError::Validation(
                "llm.base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_conversation(
    conversation: &ConversationConfig,
    agent: &AgentConfig,
) -> Result<(), ConfigError> {
    if conversation.ttl_secs == 0 {
        return Err(ConfigError::Validation(
            "conversation.ttl_secs must be greater than zero".to_string(),
        ));
    }

    if conversation.max_history_messages < 2 {
        return Err(ConfigError::Validation(
            "conversation.max_history_messages must be at least 2".to_string(),
        ));
    }

    if agent.max_dispatch_rounds == 0 || agent.max_dispatch_rounds > 5 {
        return Err(ConfigError::Validation(
            "agent.max_dispatch_rounds must be in range 1..=5".to_string(),
        ));
    }

    Ok(())
}

fn validate_media(media: &MediaConfig) -> Result<(), ConfigError> {
    if media.timeout_secs == 0 || media.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "media.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    match media.backend {
        MediaBackend::Local => {
            if media.local_dir.as_os_str().is_empty() {
                return Err(ConfigError::Validation(
                    "media.local_dir is required for the local media backend".to_string(),
                ));
            }
            if !is_http_url(media.public_base_url.trim()) {
                return Err(ConfigError::Validation(
                    "media.public_base_url must start with http:// or https://".to_string(),
                ));
            }
        }
        MediaBackend::ObjectStorage => {
            let storage_url = media.storage_url.as_deref().map(str::trim).unwrap_or_default();
            if !is_http_url(storage_url) {
                return Err(ConfigError::Validation(
                    "media.storage_url (http:// or https://) is required for the object_storage backend"
                        .to_string(),
                ));
            }
            let missing_key = media
                .storage_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing_key {
                return Err(ConfigError::Validation(
                    "media.storage_key is required for the object_storage backend".to_string(),
                ));
            }
            if media.bucket.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "media.bucket must not be empty".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    whatsapp: Option<WhatsAppPatch>,
    llm: Option<LlmPatch>,
    server: Option<ServerPatch>,
    conversation: Option<ConversationPatch>,
    agent: Option<AgentPatch>,
    media: Option<MediaPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct WhatsAppPatch {
    access_token: Option<String>,
    phone_number_id: Option<String>,
    verify_token: Option<String>,
    api_base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ConversationPatch {
    ttl_secs: Option<u64>,
    max_history_messages: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentPatch {
    max_dispatch_rounds: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct MediaPatch {
    backend: Option<MediaBackend>,
    local_dir: Option<PathBuf>,
    public_base_url: Option<String>,
    storage_url: Option<String>,
    storage_key: Option<String>,
    bucket: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
