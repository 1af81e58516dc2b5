use anyhow::{Context, Result};
use sanity_translator::config::Config;
use sanity_translator::engine::TranslationEngine;
use sanity_translator::server::{self, AppState};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignored in production)
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sanity_translator=info".parse()?),
        )
        .init();

    info!("Starting Sanity Translation Service");

    // Load configuration from environment
    let config = Config::from_env()?;

    let engine = Arc::new(TranslationEngine::from_config(&config));
    let state = AppState::new(engine, config.api_key.clone());
    let app = server::router(state, server::cors_layer(&config));

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Listening on {}", addr);
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
