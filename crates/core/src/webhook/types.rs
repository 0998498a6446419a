//! Entity-change notifications from the accounting system.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::RecordKind;

/// Errors raised while parsing a webhook payload.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Payload is not the expected JSON shape.
    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),
}

/// One external entity that changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityChangeNotification {
    /// Company (realm) the entity belongs to.
    pub realm_id: String,
    /// External entity name (`SalesReceipt`, `Deposit`, ...).
    pub entity_name: String,
    /// External entity id.
    pub entity_id: String,
    /// Operation (`Create`, `Update`, `Delete`, ...).
    pub operation: String,
    /// Change timestamp as sent.
    pub last_updated: Option<String>,
}

impl EntityChangeNotification {
    /// Composite key identifying a notification for deduplication.
    #[must_use]
    pub fn dedup_key(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.realm_id, self.entity_name, self.entity_id, self.operation
        )
    }

    /// Record kind mirrored by this entity type, if any.
    #[must_use]
    pub fn record_kind(&self) -> Option<RecordKind> {
        RecordKind::from_document_type(&self.entity_name)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Payload {
    #[serde(default)]
    event_notifications: Vec<EventNotification>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventNotification {
    realm_id: String,
    data_change_event: Option<DataChangeEvent>,
}

#[derive(Deserialize)]
struct DataChangeEvent {
    #[serde(default)]
    entities: Vec<Entity>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Entity {
    name: String,
    id: String,
    operation: String,
    last_updated: Option<String>,
}

/// Flattens a webhook body into one notification per changed entity.
///
/// # Errors
///
/// Returns `WebhookError::InvalidPayload` if the body is not valid JSON of
/// the expected shape.
pub fn parse_notifications(body: &[u8]) -> Result<Vec<EntityChangeNotification>, WebhookError> {
    let payload: Payload =
        serde_json::from_slice(body).map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;

    Ok(payload
        .event_notifications
        .into_iter()
        .flat_map(|event| {
            let realm_id = event.realm_id;
            event
                .data_change_event
                .map(|change| change.entities)
                .unwrap_or_default()
                .into_iter()
                .map(move |entity| EntityChangeNotification {
                    realm_id: realm_id.clone(),
                    entity_name: entity.name,
                    entity_id: entity.id,
                    operation: entity.operation,
                    last_updated: entity.last_updated,
                })
        })
        .collect())
}
