use anyhow::{Context, Result};
use mine_action_translator::config::Config;
use mine_action_translator::glossary::{GlossaryStore, DEFAULT_TERMS};
use mine_action_translator::llm::OpenAiClient;
use mine_action_translator::server::{self, AppState};
use mine_action_translator::translator::Translator;
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
                .add_directive("mine_action_translator=info".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .init();

    info!("Starting mine-action translator");

    let config = Config::from_env()?;

    let store = GlossaryStore::open(&config.database_path)?;
    store.seed(DEFAULT_TERMS)?;
    info!("Active glossary: {} terms", store.count()?);

    let client = OpenAiClient::new(&config)?;
    info!("Using text-generation model {}", client.model());

    let state = Arc::new(AppState {
        translator: Translator::new(store, client),
        api_key: config.api_key.clone(),
        max_upload_bytes: config.max_upload_bytes,
    });
    if state.api_key.is_none() {
        info!("API_KEY not set, glossary edits are open to any caller");
    }

    let app = server::router(state);
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context(format!("Failed to bind {}", addr))?;
    info!("✓ Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
