//! Top-level router assembly.

use axum::routing::get;
use axum::Router;

use crate::chat;
use crate::state::AppState;
use crate::voice;

async fn health_check() -> &'static str {
    "OK"
}

/// Build the full axum Router: chat hub endpoints, voice room
/// endpoints, health probe.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .merge(chat::routes::router())
        .merge(voice::routes::router())
        .with_state(state)
}
