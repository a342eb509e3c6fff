use anyhow::Context;
use axum::routing::{get, post};
use axum::Router;
use tracing_subscriber::EnvFilter;

use blog_rag::api;
use blog_rag::config::Config;
use blog_rag::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env().context("Invalid configuration")?;
    tracing::info!("LLM provider: {} ({})", config.llm.provider, config.llm.base_url);
    tracing::info!(
        "Vector store: {:?}, collection '{}'",
        config.store.backend,
        config.store.collection_name
    );

    let state = AppState::new(config.clone())?;

    let app = Router::new()
        .route("/api/chat", post(api::chat::chat))
        .route("/api/health", get(api::health::health))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
