//! Webhook intake for entity-change notifications.
//!
//! Deliveries are acknowledged once recorded; repeated deliveries of the
//! same change are counted and otherwise ignored.

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use serde::Serialize;
use tracing::{info, warn};

use ledgersync_core::webhook::{ingest, parse_notifications};

use crate::AppState;
use crate::error::{error_response, map_sync_error};

/// Creates the webhook routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/webhooks/accounting", post(receive_notifications))
}

/// Response for a webhook delivery.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    /// Notifications seen for the first time.
    pub accepted: usize,
    /// Notifications already recorded.
    pub duplicates: usize,
}

/// POST `/webhooks/accounting` - Record entity-change notifications.
async fn receive_notifications(State(state): State<AppState>, body: Bytes) -> Response {
    let notifications = match parse_notifications(&body) {
        Ok(notifications) => notifications,
        Err(e) => {
            warn!(error = %e, "Rejected webhook payload");
            return error_response(StatusCode::BAD_REQUEST, "invalid_payload", e.to_string());
        }
    };

    let report = match ingest(state.notifications.as_ref(), notifications).await {
        Ok(report) => report,
        Err(e) => return map_sync_error(&e),
    };

    for notification in &report.accepted {
        info!(
            realm_id = %notification.realm_id,
            entity = %notification.entity_name,
            entity_id = %notification.entity_id,
            operation = %notification.operation,
            record_kind = notification.record_kind().map(|k| k.as_str()),
            "Entity change recorded"
        );
    }

    (
        StatusCode::OK,
        Json(WebhookResponse {
            accepted: report.accepted.len(),
            duplicates: report.duplicates,
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use ledgersync_core::SyncService;
    use ledgersync_core::client::InMemoryAccounting;
    use ledgersync_core::resolver::LookupCache;
    use ledgersync_core::sync::InMemoryStore;
    use ledgersync_core::webhook::InMemoryNotificationLog;
    use ledgersync_shared::SyncConfig;

    use super::*;
    use crate::create_router;

    fn router(log: Arc<InMemoryNotificationLog>) -> axum::Router {
        let sync = SyncService::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(InMemoryAccounting::new()),
            SyncConfig::default(),
            LookupCache::new(),
        );
        create_router(AppState {
            sync: Arc::new(sync),
            notifications: log,
        })
    }

    async fn post(router: &axum::Router, body: String) -> (StatusCode, Value) {
        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/webhooks/accounting")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn delivery() -> String {
        json!({
            "eventNotifications": [{
                "realmId": "9130",
                "dataChangeEvent": {
                    "entities": [
                        {"name": "Deposit", "id": "88", "operation": "Create",
                         "lastUpdated": "2026-04-04T12:00:00.000Z"},
                        {"name": "SalesReceipt", "id": "145", "operation": "Update",
                         "lastUpdated": "2026-04-04T12:00:01.000Z"}
                    ]
                }
            }]
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_repeated_delivery_is_acknowledged_without_effect() {
        let log = Arc::new(InMemoryNotificationLog::new());
        let router = router(log.clone());

        let (status, body) = post(&router, delivery()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["accepted"], 2);
        assert_eq!(body["duplicates"], 0);

        let (status, body) = post(&router, delivery()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["accepted"], 0);
        assert_eq!(body["duplicates"], 2);

        assert_eq!(log.len(), 2);
    }

    #[tokio::test]
    async fn test_malformed_payload_is_bad_request() {
        let log = Arc::new(InMemoryNotificationLog::new());
        let router = router(log.clone());

        let (status, body) = post(&router, "not json".to_string()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_payload");
        assert!(log.is_empty());
    }
}
