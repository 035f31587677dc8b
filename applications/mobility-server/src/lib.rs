//! Mobility Mirror Server Library
//!
//! HTTP surface over the mirroring engine: start and cancel a sync and read
//! its resolved status.
//!
//! This library exposes the router and its components for testing purposes.

pub mod api;
pub mod config;
pub mod error;
pub mod state;

// Re-export commonly used types for convenience
pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use state::AppState;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};

/// Build the application router
pub fn create_router(app_state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/jobs/:id/sync", post(api::sync::start_sync))
        .route("/jobs/:id/sync/cancel", post(api::sync::cancel_sync))
        .route("/jobs/:id/sync/status", get(api::sync::sync_status));

    Router::new()
        .route("/health", get(api::health::health))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::default()))
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}
