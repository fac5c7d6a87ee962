mod chat;
mod config;
mod directory;
mod hub;
mod routes;
mod state;
mod transport;
mod voice;

use std::sync::Arc;

use tokio::net::TcpListener;

use config::Config;
use directory::InMemoryDirectory;
use state::AppState;
use voice::state::RoomRegistry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load()?;

    // Initialize tracing/logging
    if config.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "studyhub_realtime=info".parse().unwrap()),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "studyhub_realtime=info".parse().unwrap()),
            )
            .init();
    }

    tracing::info!(
        "StudyHub realtime server v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    // Identity lookups come from the main backend in a real deployment;
    // the standalone binary runs with an empty in-memory directory.
    let directory = Arc::new(InMemoryDirectory::new());
    let state = AppState::new(
        RoomRegistry::with_capacity(config.room_capacity),
        directory.clone(),
        directory,
    );

    let app = routes::build_router(state);

    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
