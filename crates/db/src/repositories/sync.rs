//! Sync repository: ledger records and their sync state in `PostgreSQL`.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, DbErr,
    EntityTrait, FromQueryResult, QueryFilter, QueryOrder, Set, Statement, TransactionTrait,
};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use ledgersync_core::SyncError;
use ledgersync_core::record::{
    Classification, Customer, FailedRecord, LineComponent, LinkedTransaction, Payment, Payout,
    RecordKind, Refund, SyncState, SyncStatus,
};
use ledgersync_core::sync::{SyncStore, SyncWrite};
use ledgersync_shared::types::{
    Currency, Money, PageRequest, PaymentId, PayoutId, RefundId, UserId,
};
use ledgersync_shared::{AppError, AppResult};

use super::store_error;
use crate::entities::{payment_components, payments, payout_links, payouts, refunds, users};

/// Table holding records of a kind. Only ever one of three literals, so it
/// is safe to interpolate into SQL.
const fn table(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::Payment => "payments",
        RecordKind::Refund => "refunds",
        RecordKind::Payout => "payouts",
    }
}

#[derive(Debug, FromQueryResult)]
struct SyncRow {
    sync_status: String,
    external_id: Option<String>,
    external_response: Option<Value>,
    sync_error: Option<Value>,
    last_sync_attempt_at: Option<DateTime<FixedOffset>>,
    synced_at: Option<DateTime<FixedOffset>>,
}

impl SyncRow {
    fn into_state(self) -> Result<SyncState, SyncError> {
        sync_state(
            &self.sync_status,
            self.external_id,
            self.external_response,
            self.sync_error,
            self.last_sync_attempt_at,
            self.synced_at,
        )
    }
}

#[derive(Debug, FromQueryResult)]
struct FailedRow {
    id: Uuid,
    sync_error: Option<Value>,
    last_sync_attempt_at: Option<DateTime<FixedOffset>>,
}

#[derive(Debug, FromQueryResult)]
struct CountRow {
    total: i64,
}

#[derive(Debug, FromQueryResult)]
struct LinkRow {
    transaction_kind: String,
    transaction_id: Uuid,
    amount_minor: Option<i64>,
    currency: Option<String>,
    sync_status: Option<String>,
    external_id: Option<String>,
}

fn sync_state(
    status: &str,
    external_id: Option<String>,
    external_response: Option<Value>,
    sync_error: Option<Value>,
    last_sync_attempt_at: Option<DateTime<FixedOffset>>,
    synced_at: Option<DateTime<FixedOffset>>,
) -> Result<SyncState, SyncError> {
    Ok(SyncState {
        status: parse_status(status)?,
        external_id,
        external_response,
        sync_error,
        last_sync_attempt_at: last_sync_attempt_at.map(|t| t.with_timezone(&Utc)),
        synced_at: synced_at.map(|t| t.with_timezone(&Utc)),
    })
}

fn parse_status(status: &str) -> Result<SyncStatus, SyncError> {
    SyncStatus::parse(status)
        .ok_or_else(|| SyncError::Store(format!("unknown sync status '{status}'")))
}

fn parse_money(amount_minor: i64, currency: &str) -> Result<Money, SyncError> {
    let currency: Currency = currency.trim().parse().map_err(SyncError::Store)?;
    Ok(Money::new(amount_minor, currency))
}

fn db_error(err: DbErr) -> AppError {
    AppError::Database(err.to_string())
}

/// Repository backing [`SyncStore`] with `PostgreSQL`.
///
/// Sync-state writes are single conditional `UPDATE` statements guarded
/// by `sync_status <> 'synced'`, so concurrent attempts cannot overwrite
/// one another.
#[derive(Debug, Clone)]
pub struct SyncRepository {
    db: DatabaseConnection,
}

impl SyncRepository {
    /// Creates a new sync repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Inserts a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the database insert fails.
    pub async fn insert_user(&self, customer: &Customer) -> Result<(), DbErr> {
        let now = Utc::now().into();
        users::ActiveModel {
            id: Set(customer.user_id.0),
            display_name: Set(customer.display_name.clone()),
            email: Set(customer.email.clone()),
            external_customer_id: Set(customer.external_customer_id.clone()),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&self.db)
        .await?;
        Ok(())
    }

    /// Inserts a payment and its components in one transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the database insert fails.
    pub async fn insert_payment(&self, payment: &Payment) -> Result<(), DbErr> {
        let now = Utc::now().into();
        let sync = &payment.sync;

        let txn = self.db.begin().await?;

        payments::ActiveModel {
            id: Set(payment.id.0),
            user_id: Set(payment.user_id.0),
            amount_minor: Set(payment.amount.minor_units),
            currency: Set(payment.amount.currency.to_string()),
            entity_type: Set(payment.classification.entity_type.clone()),
            property: Set(payment.classification.property.clone()),
            description: Set(payment.description.clone()),
            processor_reference: Set(payment.processor_reference.clone()),
            txn_date: Set(payment.txn_date),
            sync_status: Set(sync.status.as_str().to_string()),
            external_id: Set(sync.external_id.clone()),
            external_response: Set(sync.external_response.clone()),
            sync_error: Set(sync.sync_error.clone()),
            last_sync_attempt_at: Set(sync.last_sync_attempt_at.map(Into::into)),
            synced_at: Set(sync.synced_at.map(Into::into)),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        for component in &payment.components {
            payment_components::ActiveModel {
                payment_id: Set(payment.id.0),
                entity_type: Set(component.classification.entity_type.clone()),
                property: Set(component.classification.property.clone()),
                amount_minor: Set(component.amount_minor),
                description: Set(component.description.clone()),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
        }

        txn.commit().await
    }

    /// Inserts a refund.
    ///
    /// # Errors
    ///
    /// Returns an error if the database insert fails.
    pub async fn insert_refund(&self, refund: &Refund) -> Result<(), DbErr> {
        let now = Utc::now().into();
        let sync = &refund.sync;

        refunds::ActiveModel {
            id: Set(refund.id.0),
            payment_id: Set(refund.payment_id.0),
            amount_minor: Set(refund.amount.minor_units),
            currency: Set(refund.amount.currency.to_string()),
            entity_type: Set(refund.entity_type.clone()),
            property: Set(refund.property.clone()),
            reason: Set(refund.reason.clone()),
            processor_reference: Set(refund.processor_reference.clone()),
            txn_date: Set(refund.txn_date),
            sync_status: Set(sync.status.as_str().to_string()),
            external_id: Set(sync.external_id.clone()),
            external_response: Set(sync.external_response.clone()),
            sync_error: Set(sync.sync_error.clone()),
            last_sync_attempt_at: Set(sync.last_sync_attempt_at.map(Into::into)),
            synced_at: Set(sync.synced_at.map(Into::into)),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&self.db)
        .await?;
        Ok(())
    }

    /// Inserts a payout.
    ///
    /// # Errors
    ///
    /// Returns an error if the database insert fails.
    pub async fn insert_payout(&self, payout: &Payout) -> Result<(), DbErr> {
        let now = Utc::now().into();
        let sync = &payout.sync;

        payouts::ActiveModel {
            id: Set(payout.id.0),
            amount_minor: Set(payout.amount.minor_units),
            currency: Set(payout.amount.currency.to_string()),
            fee_total_minor: Set(payout.fee_total_minor),
            processor_reference: Set(payout.processor_reference.clone()),
            arrival_date: Set(payout.arrival_date),
            sync_status: Set(sync.status.as_str().to_string()),
            external_id: Set(sync.external_id.clone()),
            external_response: Set(sync.external_response.clone()),
            sync_error: Set(sync.sync_error.clone()),
            last_sync_attempt_at: Set(sync.last_sync_attempt_at.map(Into::into)),
            synced_at: Set(sync.synced_at.map(Into::into)),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&self.db)
        .await?;
        Ok(())
    }

    /// Links a payment or refund to a payout.
    ///
    /// Linking the same pair twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if either record is missing, `Validation` for a
    /// payout-to-payout link, and `Conflict` if the transaction already
    /// belongs to another payout.
    pub async fn link_transaction(
        &self,
        payout_id: PayoutId,
        kind: RecordKind,
        transaction_id: Uuid,
    ) -> AppResult<()> {
        if kind == RecordKind::Payout {
            return Err(AppError::Validation(
                "only payments and refunds can be linked to a payout".to_string(),
            ));
        }

        let payout = payouts::Entity::find_by_id(payout_id.0)
            .one(&self.db)
            .await
            .map_err(db_error)?;
        if payout.is_none() {
            return Err(AppError::NotFound(format!("payout {payout_id}")));
        }

        let exists = match kind {
            RecordKind::Payment => payments::Entity::find_by_id(transaction_id)
                .one(&self.db)
                .await
                .map_err(db_error)?
                .is_some(),
            RecordKind::Refund => refunds::Entity::find_by_id(transaction_id)
                .one(&self.db)
                .await
                .map_err(db_error)?
                .is_some(),
            RecordKind::Payout => false,
        };
        if !exists {
            return Err(AppError::NotFound(format!("{kind} {transaction_id}")));
        }

        self.db
            .execute(Statement::from_sql_and_values(
                DbBackend::Postgres,
                r"INSERT INTO payout_links (payout_id, transaction_kind, transaction_id)
                  VALUES ($1, $2, $3)
                  ON CONFLICT (transaction_kind, transaction_id) DO NOTHING",
                [payout_id.0.into(), kind.as_str().into(), transaction_id.into()],
            ))
            .await
            .map_err(db_error)?;

        let link = payout_links::Entity::find()
            .filter(payout_links::Column::TransactionKind.eq(kind.as_str()))
            .filter(payout_links::Column::TransactionId.eq(transaction_id))
            .one(&self.db)
            .await
            .map_err(db_error)?
            .ok_or_else(|| AppError::Internal("payout link vanished".to_string()))?;

        if link.payout_id == payout_id.0 {
            Ok(())
        } else {
            Err(AppError::Conflict(format!(
                "{kind} {transaction_id} is already linked to payout {}",
                link.payout_id
            )))
        }
    }

    async fn conditional_write(
        &self,
        kind: RecordKind,
        id: Uuid,
        statement: Statement,
    ) -> Result<SyncWrite, SyncError> {
        let result = self.db.execute(statement).await.map_err(store_error)?;
        if result.rows_affected() > 0 {
            return Ok(SyncWrite::Applied);
        }

        match self.load_sync_state(kind, id).await? {
            Some(state) => Ok(SyncWrite::AlreadySynced(state)),
            None => Err(SyncError::NotFound { kind, id }),
        }
    }
}

#[async_trait]
impl SyncStore for SyncRepository {
    async fn load_payment(&self, id: PaymentId) -> Result<Option<Payment>, SyncError> {
        let Some(model) = payments::Entity::find_by_id(id.0)
            .one(&self.db)
            .await
            .map_err(store_error)?
        else {
            return Ok(None);
        };

        let components = payment_components::Entity::find()
            .filter(payment_components::Column::PaymentId.eq(id.0))
            .order_by_asc(payment_components::Column::Id)
            .all(&self.db)
            .await
            .map_err(store_error)?
            .into_iter()
            .map(|c| LineComponent {
                classification: Classification {
                    entity_type: c.entity_type,
                    property: c.property,
                },
                amount_minor: c.amount_minor,
                description: c.description,
            })
            .collect();

        Ok(Some(Payment {
            id,
            user_id: UserId(model.user_id),
            amount: parse_money(model.amount_minor, &model.currency)?,
            classification: Classification {
                entity_type: model.entity_type,
                property: model.property,
            },
            components,
            description: model.description,
            processor_reference: model.processor_reference,
            txn_date: model.txn_date,
            sync: sync_state(
                &model.sync_status,
                model.external_id,
                model.external_response,
                model.sync_error,
                model.last_sync_attempt_at,
                model.synced_at,
            )?,
        }))
    }

    async fn load_refund(&self, id: RefundId) -> Result<Option<Refund>, SyncError> {
        let Some(model) = refunds::Entity::find_by_id(id.0)
            .one(&self.db)
            .await
            .map_err(store_error)?
        else {
            return Ok(None);
        };

        Ok(Some(Refund {
            id,
            payment_id: PaymentId(model.payment_id),
            amount: parse_money(model.amount_minor, &model.currency)?,
            entity_type: model.entity_type,
            property: model.property,
            reason: model.reason,
            processor_reference: model.processor_reference,
            txn_date: model.txn_date,
            sync: sync_state(
                &model.sync_status,
                model.external_id,
                model.external_response,
                model.sync_error,
                model.last_sync_attempt_at,
                model.synced_at,
            )?,
        }))
    }

    async fn load_payout(&self, id: PayoutId) -> Result<Option<Payout>, SyncError> {
        let Some(model) = payouts::Entity::find_by_id(id.0)
            .one(&self.db)
            .await
            .map_err(store_error)?
        else {
            return Ok(None);
        };

        Ok(Some(Payout {
            id,
            amount: parse_money(model.amount_minor, &model.currency)?,
            fee_total_minor: model.fee_total_minor,
            processor_reference: model.processor_reference,
            arrival_date: model.arrival_date,
            sync: sync_state(
                &model.sync_status,
                model.external_id,
                model.external_response,
                model.sync_error,
                model.last_sync_attempt_at,
                model.synced_at,
            )?,
        }))
    }

    async fn linked_transactions(
        &self,
        payout_id: PayoutId,
    ) -> Result<Vec<LinkedTransaction>, SyncError> {
        let rows = LinkRow::find_by_statement(Statement::from_sql_and_values(
            DbBackend::Postgres,
            r"SELECT l.transaction_kind,
                     l.transaction_id,
                     COALESCE(p.amount_minor, r.amount_minor) AS amount_minor,
                     COALESCE(p.currency, r.currency) AS currency,
                     COALESCE(p.sync_status, r.sync_status) AS sync_status,
                     COALESCE(p.external_id, r.external_id) AS external_id
              FROM payout_links l
              LEFT JOIN payments p ON l.transaction_kind = 'payment' AND p.id = l.transaction_id
              LEFT JOIN refunds r ON l.transaction_kind = 'refund' AND r.id = l.transaction_id
              WHERE l.payout_id = $1
              ORDER BY l.id",
            [payout_id.0.into()],
        ))
        .all(&self.db)
        .await
        .map_err(store_error)?;

        let mut linked = Vec::with_capacity(rows.len());
        for row in rows {
            let kind = RecordKind::parse(&row.transaction_kind).ok_or_else(|| {
                SyncError::Store(format!("unknown link kind '{}'", row.transaction_kind))
            })?;
            let (Some(amount_minor), Some(currency), Some(status)) =
                (row.amount_minor, row.currency, row.sync_status)
            else {
                warn!(
                    payout_id = %payout_id,
                    transaction_id = %row.transaction_id,
                    "Payout link points at a missing transaction"
                );
                continue;
            };

            let amount = parse_money(amount_minor.abs(), &currency)?;
            linked.push(LinkedTransaction {
                kind,
                id: row.transaction_id,
                amount_minor: amount.minor_units,
                currency: amount.currency,
                status: parse_status(&status)?,
                external_id: row.external_id,
            });
        }

        Ok(linked)
    }

    async fn payouts_linking(
        &self,
        kind: RecordKind,
        id: Uuid,
    ) -> Result<Vec<PayoutId>, SyncError> {
        let links = payout_links::Entity::find()
            .filter(payout_links::Column::TransactionKind.eq(kind.as_str()))
            .filter(payout_links::Column::TransactionId.eq(id))
            .order_by_asc(payout_links::Column::Id)
            .all(&self.db)
            .await
            .map_err(store_error)?;

        Ok(links.into_iter().map(|l| PayoutId(l.payout_id)).collect())
    }

    async fn load_customer(&self, user_id: UserId) -> Result<Option<Customer>, SyncError> {
        let user = users::Entity::find_by_id(user_id.0)
            .one(&self.db)
            .await
            .map_err(store_error)?;

        Ok(user.map(|u| Customer {
            user_id,
            display_name: u.display_name,
            email: u.email,
            external_customer_id: u.external_customer_id,
        }))
    }

    async fn claim_customer_ref(
        &self,
        user_id: UserId,
        external_id: &str,
    ) -> Result<String, SyncError> {
        self.db
            .execute(Statement::from_sql_and_values(
                DbBackend::Postgres,
                r"UPDATE users SET external_customer_id = $1, updated_at = now()
                  WHERE id = $2 AND external_customer_id IS NULL",
                [external_id.into(), user_id.0.into()],
            ))
            .await
            .map_err(store_error)?;

        let user = users::Entity::find_by_id(user_id.0)
            .one(&self.db)
            .await
            .map_err(store_error)?
            .ok_or(SyncError::UserNotFound(user_id))?;

        user.external_customer_id
            .ok_or_else(|| SyncError::Store(format!("customer ref for user {user_id} not stored")))
    }

    async fn load_sync_state(
        &self,
        kind: RecordKind,
        id: Uuid,
    ) -> Result<Option<SyncState>, SyncError> {
        let row = SyncRow::find_by_statement(Statement::from_sql_and_values(
            DbBackend::Postgres,
            format!(
                "SELECT sync_status, external_id, external_response, sync_error, \
                 last_sync_attempt_at, synced_at FROM {} WHERE id = $1",
                table(kind)
            ),
            [id.into()],
        ))
        .one(&self.db)
        .await
        .map_err(store_error)?;

        row.map(SyncRow::into_state).transpose()
    }

    async fn mark_synced(
        &self,
        kind: RecordKind,
        id: Uuid,
        external_id: &str,
        response: &Value,
        at: DateTime<Utc>,
    ) -> Result<SyncWrite, SyncError> {
        let statement = Statement::from_sql_and_values(
            DbBackend::Postgres,
            format!(
                "UPDATE {} SET sync_status = 'synced', external_id = $1, \
                 external_response = $2, sync_error = NULL, last_sync_attempt_at = $3, \
                 synced_at = $3, updated_at = now() \
                 WHERE id = $4 AND sync_status <> 'synced'",
                table(kind)
            ),
            [
                external_id.into(),
                response.clone().into(),
                at.into(),
                id.into(),
            ],
        );
        self.conditional_write(kind, id, statement).await
    }

    async fn mark_failed(
        &self,
        kind: RecordKind,
        id: Uuid,
        error: &Value,
        at: DateTime<Utc>,
    ) -> Result<SyncWrite, SyncError> {
        let statement = Statement::from_sql_and_values(
            DbBackend::Postgres,
            format!(
                "UPDATE {} SET sync_status = 'failed', sync_error = $1, \
                 last_sync_attempt_at = $2, updated_at = now() \
                 WHERE id = $3 AND sync_status <> 'synced'",
                table(kind)
            ),
            [error.clone().into(), at.into(), id.into()],
        );
        self.conditional_write(kind, id, statement).await
    }

    async fn reset_failed(&self, kind: RecordKind, id: Uuid) -> Result<bool, SyncError> {
        let result = self
            .db
            .execute(Statement::from_sql_and_values(
                DbBackend::Postgres,
                format!(
                    "UPDATE {} SET sync_status = 'pending', updated_at = now() \
                     WHERE id = $1 AND sync_status = 'failed'",
                    table(kind)
                ),
                [id.into()],
            ))
            .await
            .map_err(store_error)?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }
        match self.load_sync_state(kind, id).await? {
            Some(_) => Ok(false),
            None => Err(SyncError::NotFound { kind, id }),
        }
    }

    async fn list_failed(
        &self,
        kind: RecordKind,
        page: &PageRequest,
    ) -> Result<(Vec<FailedRecord>, u64), SyncError> {
        let count = CountRow::find_by_statement(Statement::from_string(
            DbBackend::Postgres,
            format!(
                "SELECT COUNT(*) AS total FROM {} WHERE sync_status = 'failed'",
                table(kind)
            ),
        ))
        .one(&self.db)
        .await
        .map_err(store_error)?
        .map_or(0, |c| c.total);

        let limit = i64::try_from(page.limit()).unwrap_or(i64::MAX);
        let offset = i64::try_from(page.offset()).unwrap_or(i64::MAX);

        let rows = FailedRow::find_by_statement(Statement::from_sql_and_values(
            DbBackend::Postgres,
            format!(
                "SELECT id, sync_error, last_sync_attempt_at FROM {} \
                 WHERE sync_status = 'failed' \
                 ORDER BY last_sync_attempt_at DESC NULLS LAST, id \
                 LIMIT $1 OFFSET $2",
                table(kind)
            ),
            [limit.into(), offset.into()],
        ))
        .all(&self.db)
        .await
        .map_err(store_error)?;

        let data = rows
            .into_iter()
            .map(|row| FailedRecord {
                kind,
                id: row.id,
                sync_error: row.sync_error,
                last_sync_attempt_at: row.last_sync_attempt_at.map(|t| t.with_timezone(&Utc)),
            })
            .collect();

        Ok((data, u64::try_from(count).unwrap_or(0)))
    }
}
