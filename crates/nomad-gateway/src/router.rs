use axum::Router;
use axum::extract::State;
use axum::routing::{get, post};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api;
use crate::state::SharedState;

/// Build the main application router with all routes.
pub fn build_router(state: SharedState) -> Router {
    let cors = if state.config.gateway.cors_permissive {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(api::chat))
        .route("/api/voice-chat", post(api::voice_chat))
        .route("/api/transcribe", post(api::transcribe))
        .route("/api/reset", post(api::reset))
        .route("/api/metrics", get(api::metrics))
        .route("/api/cache/clear", post(api::clear_cache))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
}

async fn health(State(state): State<SharedState>) -> axum::Json<serde_json::Value> {
    let provider_healthy = state.runtime.health_check().await;
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "provider": state.runtime.provider_id(),
        "provider_healthy": provider_healthy,
        "model": state.runtime.settings().model,
        "tools": state.runtime.tools().names(),
        "sessions": state.sessions.len(),
    }))
}
