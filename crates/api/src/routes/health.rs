//! Health check endpoints

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub store: String,
    pub active_connections: usize,
    pub active_rooms: usize,
    pub auto_reply: bool,
}

/// Health check endpoint
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let store_status = match state.chat.store.ping().await {
        Ok(_) => "healthy",
        Err(e) => {
            tracing::warn!(error = %e, "Health check: store unavailable");
            "unhealthy"
        }
    };

    let overall_status = if store_status == "healthy" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let stats = state.chat.get_stats().await;

    (
        overall_status,
        Json(HealthResponse {
            status: store_status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            store: store_status.to_string(),
            active_connections: stats.active_connections,
            active_rooms: stats.active_rooms,
            auto_reply: state.config.auto_reply_enabled,
        }),
    )
}

/// Liveness probe (just returns 200 if the server is running)
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}
