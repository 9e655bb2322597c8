use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers::{control, health};
use crate::state::AppState;
use crate::websocket::handle_websocket;

/// Assembles the full HTTP surface over a built state.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(handle_websocket))
        .route("/health", get(health::health))
        .route("/api/config", get(control::config))
        .route("/api/start", post(control::start))
        .route("/api/stop", post(control::stop))
        .route("/api/restart", post(control::restart))
        .route("/api/set_mem", post(control::set_mem))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
