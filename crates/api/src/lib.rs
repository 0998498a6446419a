//! HTTP API layer with Axum routes.
//!
//! This crate provides:
//! - Sync trigger, retry and status routes
//! - Failed-record listing
//! - Webhook intake for entity-change notifications

pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use ledgersync_core::SyncService;
use ledgersync_core::webhook::NotificationLog;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Sync engine.
    pub sync: Arc<SyncService>,
    /// Durable log used to deduplicate webhook deliveries.
    pub notifications: Arc<dyn NotificationLog>,
}

/// Creates the main application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", routes::api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
