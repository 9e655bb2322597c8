use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;
use crate::supervisor::SupervisorState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: i64,
    pub subscribers: usize,
    pub supervisor: SupervisorState,
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
        subscribers: state.hub().subscriber_count(),
        supervisor: state.supervisor().state(),
    })
}
