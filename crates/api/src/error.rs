//! JSON error responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::{error, warn};

use ledgersync_core::SyncError;

/// Builds a `{error, message}` response.
pub fn error_response(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Maps a sync failure to its HTTP response.
///
/// The body carries the same structured detail that is persisted on the
/// record, so callers see why it failed without a second request.
pub fn map_sync_error(e: &SyncError) -> Response {
    let status =
        StatusCode::from_u16(e.http_status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    if status.is_server_error() {
        error!(error = %e, code = e.error_code(), "Sync request failed");
    } else {
        warn!(error = %e, code = e.error_code(), "Sync request rejected");
    }

    let message = if matches!(e, SyncError::Store(_)) {
        "An error occurred".to_string()
    } else {
        e.to_string()
    };

    (
        status,
        Json(json!({
            "error": e.error_code(),
            "message": message,
            "retryable": e.is_retryable(),
            "details": e.failure_detail(),
        })),
    )
        .into_response()
}
