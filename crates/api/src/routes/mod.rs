//! API routes

pub mod health;
pub mod messages;

use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{state::AppState, websocket::ws_handler};

/// Create all routes
pub fn create_router(state: AppState) -> Router {
    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness));

    let api_routes = Router::new()
        .route("/participants", get(messages::list_participants))
        .route(
            "/messages/:participant",
            get(messages::list_messages).post(messages::send_message),
        );

    let ws_routes = Router::new()
        .route("/ws/chat/:role", get(ws_handler))
        .route("/ws/chat/:role/:identity", get(ws_handler));

    Router::new()
        .merge(health_routes)
        .merge(ws_routes)
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
