mod models;
mod handlers;
mod routes;
mod docs;
mod config;
mod session;
mod ws;

use std::panic;
use std::sync::atomic::AtomicU32;
use std::sync::Arc;

use axum::http::HeaderValue;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use tracing::{info, error, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use config::Config;
use docs::ApiDoc;
use routes::api::create_app;
use session::SessionRegistry;

/// Shared state reachable from every connection handler.
pub struct AppState {
    pub registry: SessionRegistry,
    pub connections: AtomicU32,
    pub authority_handoff: bool,
}

impl AppState {
    pub fn new(authority_handoff: bool) -> Self {
        Self {
            registry: SessionRegistry::new(),
            connections: AtomicU32::new(0),
            authority_handoff,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {

    // Set panic hook for better error messages
    panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
    }));

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            // Default to info level, but allow debug for our app
            "watchsync=debug,tower_http=debug,axum::rejection=trace,info".into()
        }))
        .init();

    info!("Starting server...");

    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        error!("Failed to load configuration: {}", e);
        warn!("Using default configuration");
        Config::default()
    });

    // CORS: explicit origins when configured, otherwise any origin (the
    // service sits behind whatever hosts the player frontend)
    let cors = match &config.cors_origins {
        Some(origins) => {
            let origins: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|origin| origin.trim().parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        }
        None => CorsLayer::permissive(),
    };

    let app_state = Arc::new(AppState::new(config.authority_handoff));
    if config.authority_handoff {
        info!("Authority handoff enabled: departing authorities promote a remaining member");
    }

    // Combine all routes
    let app_routes = create_app(app_state)
        // Mount Swagger UI
        .merge(SwaggerUi::new("/swagger").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Add tracing layer
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start the server
    let listener = tokio::net::TcpListener::bind(config.server_address())
        .await
        .unwrap_or_else(|_| panic!("Failed to bind to {}", config.server_address()));

    info!("🚀 Server running on http://{}", config.server_address());
    info!("📡 Sync WebSocket available at ws://{}/ws", config.server_address());
    info!("📚 Swagger UI available at http://{}/swagger", config.server_address());

    axum::serve(listener, app_routes)
        .await
        .expect("Server failed to start");
}
