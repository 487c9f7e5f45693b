//! Main Entrypoint for the Vidur API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Initializing the process-wide logging subscriber.
//! 3. Building the agent persona and the Gemini Live runner.
//! 4. Constructing the Axum router and applying middleware.
//! 5. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use gemini_realtime::GeminiLiveRunner;
use std::{net::SocketAddr, path::Path, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::fmt::time::ChronoLocal;
use vidur_api::{
    config::{Config, LogFormat},
    router::create_router,
    state::AppState,
};
use vidur_core::agent::AgentConfig;

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    info!("Received shutdown signal. Shutting down gracefully...");
}

/// Loads the agent description from `prompt.txt` in the prompts directory.
fn load_description(prompts_path: &Path) -> anyhow::Result<String> {
    let path = prompts_path.join("prompt.txt");
    std::fs::read_to_string(&path)
        .with_context(|| format!("Could not read agent description from {}", path.display()))
}

fn init_logging(config: &Config) {
    match config.log_format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_max_level(config.log_level)
            .with_timer(ChronoLocal::rfc_3339())
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_max_level(config.log_level)
            .with_timer(ChronoLocal::rfc_3339())
            .init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    init_logging(&config);
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Initialize the Live Runner ---
    let description = load_description(&config.prompts_path)?;
    let agent = AgentConfig::default()
        .with_model(config.live_model.clone())
        .with_description(description);
    let mut runner = GeminiLiveRunner::new(config.google_api_key.clone(), agent);
    if let Some(url) = &config.live_url {
        runner = runner.with_base_url(url.clone());
    }

    let app_state = Arc::new(AppState {
        runner: Arc::new(runner),
        config: Arc::new(config.clone()),
    });

    // --- 4. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state).layer(cors);

    // --- 5. Start Server ---
    info!(
        model = %config.live_model,
        bind_address = %config.bind_address,
        static_dir = %config.static_dir.display(),
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
