//! Sync trigger, retry, status and failure routes.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use ledgersync_core::record::RecordKind;
use ledgersync_shared::types::PageRequest;

use crate::AppState;
use crate::error::{error_response, map_sync_error};

/// Creates the sync routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/sync/{kind}/failures", get(list_failures))
        .route("/sync/{kind}/{id}", get(get_sync_state).post(trigger_sync))
        .route("/sync/{kind}/{id}/retry", post(retry_sync))
}

/// Query parameters for the failure listing.
#[derive(Debug, Deserialize)]
pub struct FailuresQuery {
    /// Page number (1-indexed).
    pub page: Option<u32>,
    /// Items per page.
    pub limit: Option<u32>,
}

fn parse_kind(kind: &str) -> Result<RecordKind, Response> {
    RecordKind::parse(kind).ok_or_else(|| {
        error_response(
            StatusCode::BAD_REQUEST,
            "invalid_kind",
            format!("Unknown record kind: {kind}"),
        )
    })
}

/// POST `/sync/{kind}/{id}` - Run the entry point for a record.
async fn trigger_sync(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, Uuid)>,
) -> Response {
    let kind = match parse_kind(&kind) {
        Ok(kind) => kind,
        Err(response) => return response,
    };

    match state.sync.sync(kind, id).await {
        Ok(outcome) => {
            info!(
                kind = %kind,
                id = %id,
                external_id = %outcome.external_id,
                already_synced = outcome.already_synced,
                "Sync request completed"
            );
            (StatusCode::OK, Json(outcome)).into_response()
        }
        Err(e) => map_sync_error(&e),
    }
}

/// POST `/sync/{kind}/{id}/retry` - Reset a failed record and run it.
async fn retry_sync(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, Uuid)>,
) -> Response {
    let kind = match parse_kind(&kind) {
        Ok(kind) => kind,
        Err(response) => return response,
    };

    match state.sync.retry(kind, id).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(e) => map_sync_error(&e),
    }
}

/// GET `/sync/{kind}/{id}` - Current sync state of a record.
async fn get_sync_state(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, Uuid)>,
) -> Response {
    let kind = match parse_kind(&kind) {
        Ok(kind) => kind,
        Err(response) => return response,
    };

    match state.sync.sync_state(kind, id).await {
        Ok(sync) => (StatusCode::OK, Json(sync)).into_response(),
        Err(e) => map_sync_error(&e),
    }
}

/// GET `/sync/{kind}/failures` - Failed records with their last error.
async fn list_failures(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(query): Query<FailuresQuery>,
) -> Response {
    let kind = match parse_kind(&kind) {
        Ok(kind) => kind,
        Err(response) => return response,
    };

    let page = PageRequest::new(query.page.unwrap_or(1), query.limit.unwrap_or(20));

    match state.sync.failures(kind, &page).await {
        Ok(failures) => (StatusCode::OK, Json(failures)).into_response(),
        Err(e) => map_sync_error(&e),
    }
}
