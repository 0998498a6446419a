//! API route definitions.

use axum::Router;

use crate::AppState;

pub mod health;
pub mod sync;
pub mod webhooks;

/// Creates the API router with all routes.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(health::routes())
        .merge(sync::routes())
        .merge(webhooks::routes())
}
