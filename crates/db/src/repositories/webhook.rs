//! Webhook event repository.

use async_trait::async_trait;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, Statement,
};
use uuid::Uuid;

use ledgersync_core::SyncError;
use ledgersync_core::webhook::{EntityChangeNotification, NotificationLog};

use super::store_error;
use crate::entities::webhook_events;

/// Durable log of received entity-change notifications.
///
/// The unique `dedup_key` column decides which delivery is first.
#[derive(Debug, Clone)]
pub struct WebhookEventRepository {
    db: DatabaseConnection,
}

impl WebhookEventRepository {
    /// Creates a new webhook event repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Counts recorded events for an entity.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn count_for_entity(&self, entity_name: &str, entity_id: &str) -> Result<u64, DbErr> {
        webhook_events::Entity::find()
            .filter(webhook_events::Column::EntityName.eq(entity_name))
            .filter(webhook_events::Column::EntityId.eq(entity_id))
            .count(&self.db)
            .await
    }
}

#[async_trait]
impl NotificationLog for WebhookEventRepository {
    async fn record(&self, notification: &EntityChangeNotification) -> Result<bool, SyncError> {
        let result = self
            .db
            .execute(Statement::from_sql_and_values(
                DbBackend::Postgres,
                r"INSERT INTO webhook_events
                    (id, dedup_key, realm_id, entity_name, entity_id, operation, last_updated)
                  VALUES ($1, $2, $3, $4, $5, $6, $7)
                  ON CONFLICT (dedup_key) DO NOTHING",
                [
                    Uuid::now_v7().into(),
                    notification.dedup_key().into(),
                    notification.realm_id.clone().into(),
                    notification.entity_name.clone().into(),
                    notification.entity_id.clone().into(),
                    notification.operation.clone().into(),
                    notification.last_updated.clone().into(),
                ],
            ))
            .await
            .map_err(store_error)?;

        Ok(result.rows_affected() == 1)
    }
}
