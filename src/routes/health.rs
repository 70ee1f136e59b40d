use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::app::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub services: ServiceHealth,
}

#[derive(Serialize)]
pub struct ServiceHealth {
    /// `ok` once signing keys are cached, `cold` until the first fetch succeeds
    pub token_keys: String,
    pub active_sessions: usize,
}

/// Health check endpoint - public
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let token_keys = if state.jwks.key_count() > 0 { "ok" } else { "cold" };

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        services: ServiceHealth {
            token_keys: token_keys.to_string(),
            active_sessions: state.sessions.len(),
        },
    })
}
