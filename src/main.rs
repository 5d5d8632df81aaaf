mod config;
mod error;
mod gemini;
mod media;
mod models;
mod prompt;
mod routes;
mod studio;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;
use crate::gemini::GeminiClient;
use crate::prompt::PromptAssets;
use crate::routes::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Init tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = Arc::new(Config::from_env().context("invalid configuration")?);
    if config.api_key.is_empty() {
        tracing::warn!("GEMINI_API_KEY is not set; every generation call will fail");
    } else {
        tracing::info!("Using API key: {}", config.api_key_summary());
    }
    tracing::info!(
        text_model = %config.text_model,
        image_model = %config.image_model,
        "Gemini models configured"
    );

    let assets = PromptAssets::load().context("loading prompt assets")?;
    let gemini = GeminiClient::new(config.clone(), assets).context("building HTTP client")?;
    let state = AppState {
        studio: Arc::default(),
        backend: Arc::new(gemini),
    };

    let app = router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "Starting server");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
