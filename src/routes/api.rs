use std::sync::Arc;

use axum::{routing::get, Router};

use crate::handlers::{diagnostics, health_check, ready_check};
use crate::ws::handler::websocket_handler;
use crate::AppState;

/// Create API routes
pub fn create_api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(ready_check))
        .route("/v1/diagnostics", get(diagnostics))
}

/// Assemble the application router: API routes plus the sync WebSocket
pub fn create_app(app_state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", create_api_routes())
        .route("/ws", get(websocket_handler))
        .with_state(app_state)
}
