use std::sync::Arc;
use std::time::Duration;

use catalogbot_agent::catalog::CatalogService;
use catalogbot_agent::guardrails::GuardrailPolicy;
use catalogbot_agent::tools::ToolRegistry;
use catalogbot_agent::{
    AgentRuntime, ConversationEngine, LlmError, OpenAiCompatibleClient, RuntimeSettings,
};
use catalogbot_core::config::{AppConfig, ConfigError, LoadOptions};
use catalogbot_db::repositories::{
    ConversationStore, InboundLog, SqlConversationStore, SqlInboundLog, SqlProductRepository,
    SqlSellerRepository,
};
use catalogbot_db::{connect_with_config, migrations, DbPool};
use catalogbot_whatsapp::{
    media_store_from_config, CloudApiClient, CloudApiError, InboundProcessor, MediaError,
    MediaRelay,
};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub runtime: Arc<AgentRuntime>,
    pub processor: Arc<InboundProcessor>,
    pub conversations: Arc<dyn ConversationStore>,
    pub inbound_log: Arc<dyn InboundLog>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("language model client: {0}")]
    Llm(#[source] LlmError),
    #[error("whatsapp client: {0}")]
    CloudApi(#[source] CloudApiError),
    #[error("media store: {0}")]
    Media(#[source] MediaError),
}

#[allow(dead_code)]
pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

/// Credentials are checked before the database is touched so a misconfigured
/// deployment fails without side effects.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", correlation_id = "bootstrap", "starting application bootstrap");

    config.whatsapp.require_credentials()?;
    config.llm.require_credentials()?;

    let db_pool = connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let conversations: Arc<dyn ConversationStore> = Arc::new(SqlConversationStore::new(db_pool.clone()));
    let inbound_log: Arc<dyn InboundLog> = Arc::new(SqlInboundLog::new(db_pool.clone()));
    let catalog = Arc::new(CatalogService::new(Arc::new(SqlProductRepository::new(db_pool.clone()))));

    let llm = OpenAiCompatibleClient::from_config(&config.llm).map_err(BootstrapError::Llm)?;
    let engine = ConversationEngine::new(
        Arc::new(llm),
        Arc::new(ToolRegistry::catalog(catalog)),
        GuardrailPolicy::default(),
        config.agent.max_dispatch_rounds,
    );
    let runtime = Arc::new(AgentRuntime::new(
        engine,
        conversations.clone(),
        Arc::new(SqlSellerRepository::new(db_pool.clone())),
        RuntimeSettings::from_config(&config),
    ));

    let media_timeout = Duration::from_secs(config.media.timeout_secs);
    let cloud_api = Arc::new(
        CloudApiClient::from_config(&config.whatsapp, media_timeout).map_err(BootstrapError::CloudApi)?,
    );
    let store = media_store_from_config(&config.media).map_err(BootstrapError::Media)?;
    info!(
        event_name = "system.bootstrap.media_store",
        correlation_id = "bootstrap",
        backend = store.backend(),
        "media store selected"
    );
    let relay = Arc::new(MediaRelay::new(cloud_api.clone(), store, media_timeout));

    let processor = Arc::new(InboundProcessor::new(
        runtime.clone(),
        cloud_api,
        Some(relay),
        inbound_log.clone(),
    ));

    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        llm_provider = config.llm.provider.as_str(),
        llm_model = %config.llm.model,
        "application wired"
    );

    Ok(Application { config, db_pool, runtime, processor, conversations, inbound_log })
}
