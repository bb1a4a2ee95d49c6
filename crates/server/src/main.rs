mod bootstrap;
mod health;
mod maintenance;
mod webhook;

use std::time::Duration;

use anyhow::Result;
use axum::Router;
use catalogbot_core::config::{AppConfig, LoadOptions, MediaBackend};
use tower_http::services::ServeDir;

use crate::webhook::{InFlightTurns, WebhookState};

fn init_logging(config: &AppConfig) {
    use catalogbot_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let in_flight = InFlightTurns::default();

    let mut router = Router::new()
        .merge(webhook::router(WebhookState::new(
            app.config.whatsapp.verify_token.clone(),
            app.processor.clone(),
            in_flight.clone(),
        )))
        .merge(health::router(app.db_pool.clone()));
    if app.config.media.backend == MediaBackend::Local {
        router = router.nest_service("/media", ServeDir::new(&app.config.media.local_dir));
    }

    let sweeper = maintenance::spawn(app.conversations.clone(), app.inbound_log.clone());

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        address = %address,
        media_backend = app.config.media.backend.as_str(),
        "catalogbot-server listening"
    );

    axum::serve(listener, router).with_graceful_shutdown(wait_for_shutdown()).await?;

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        running_turns = in_flight.running(),
        "draining in-flight turns"
    );
    sweeper.abort();
    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    if !in_flight.drain(grace).await {
        tracing::warn!(
            event_name = "system.server.drain_timeout",
            correlation_id = "shutdown",
            running_turns = in_flight.running(),
            "shutdown grace period elapsed with turns still running"
        );
    }
    app.db_pool.close().await;

    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(event_name = "system.server.signal_failed", error = %error, "ctrl-c handler unavailable");
        std::future::pending::<()>().await;
    }
}
