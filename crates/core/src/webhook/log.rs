//! Durable deduplication of notifications.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use super::types::EntityChangeNotification;
use crate::error::SyncError;

/// Log of notifications already accepted.
#[async_trait]
pub trait NotificationLog: Send + Sync {
    /// Records a notification. Returns false if its dedup key was already
    /// recorded.
    async fn record(&self, notification: &EntityChangeNotification) -> Result<bool, SyncError>;
}

/// Outcome of ingesting a batch of notifications.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Notifications seen for the first time.
    pub accepted: Vec<EntityChangeNotification>,
    /// Number of notifications already recorded.
    pub duplicates: usize,
}

/// Records each notification and keeps only the new ones.
///
/// # Errors
///
/// Returns the first error from the log; notifications recorded before it
/// stay recorded.
pub async fn ingest(
    log: &dyn NotificationLog,
    notifications: Vec<EntityChangeNotification>,
) -> Result<IngestReport, SyncError> {
    let mut report = IngestReport::default();

    for notification in notifications {
        if log.record(&notification).await? {
            report.accepted.push(notification);
        } else {
            debug!(key = %notification.dedup_key(), "Duplicate notification ignored");
            report.duplicates += 1;
        }
    }

    Ok(report)
}

/// [`NotificationLog`] held in memory.
#[derive(Default)]
pub struct InMemoryNotificationLog {
    keys: Mutex<HashSet<String>>,
}

impl InMemoryNotificationLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct notifications recorded.
    pub fn len(&self) -> usize {
        self.keys.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl NotificationLog for InMemoryNotificationLog {
    async fn record(&self, notification: &EntityChangeNotification) -> Result<bool, SyncError> {
        Ok(self
            .keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(notification.dedup_key()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification(id: &str, operation: &str) -> EntityChangeNotification {
        EntityChangeNotification {
            realm_id: "9130".to_string(),
            entity_name: "Deposit".to_string(),
            entity_id: id.to_string(),
            operation: operation.to_string(),
            last_updated: None,
        }
    }

    #[tokio::test]
    async fn test_duplicates_are_acknowledged_without_effect() {
        let log = InMemoryNotificationLog::new();

        let first = ingest(&log, vec![notification("1", "Create")]).await.unwrap();
        assert_eq!(first.accepted.len(), 1);

        let second = ingest(
            &log,
            vec![notification("1", "Create"), notification("1", "Update")],
        )
        .await
        .unwrap();
        assert_eq!(second.duplicates, 1);
        assert_eq!(second.accepted, vec![notification("1", "Update")]);
        assert_eq!(log.len(), 2);
    }

    #[tokio::test]
    async fn test_duplicates_within_one_batch() {
        let log = InMemoryNotificationLog::new();
        let report = ingest(
            &log,
            vec![notification("5", "Create"), notification("5", "Create")],
        )
        .await
        .unwrap();
        assert_eq!(report.accepted.len(), 1);
        assert_eq!(report.duplicates, 1);
    }
}
