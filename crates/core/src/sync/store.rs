//! Record store capability used by the sync engine.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use ledgersync_shared::types::{PageRequest, PaymentId, PayoutId, RefundId, UserId};

use crate::error::SyncError;
use crate::record::{
    Customer, FailedRecord, LinkedTransaction, Payment, Payout, RecordKind, Refund, SyncState,
};

/// Result of a conditional sync-state write.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncWrite {
    /// The write took effect.
    Applied,
    /// The record was already synced; nothing was written. Carries the
    /// stored state that won.
    AlreadySynced(SyncState),
}

/// Persistence operations needed by the sync engine.
///
/// Writes to sync state are conditional: nothing may overwrite a record
/// that is already `synced`. Implementations must make that check and the
/// write a single atomic step.
#[async_trait]
pub trait SyncStore: Send + Sync {
    /// Loads a payment with its components.
    async fn load_payment(&self, id: PaymentId) -> Result<Option<Payment>, SyncError>;

    /// Loads a refund.
    async fn load_refund(&self, id: RefundId) -> Result<Option<Refund>, SyncError>;

    /// Loads a payout.
    async fn load_payout(&self, id: PayoutId) -> Result<Option<Payout>, SyncError>;

    /// Payments and refunds linked to a payout, in link order.
    async fn linked_transactions(
        &self,
        payout_id: PayoutId,
    ) -> Result<Vec<LinkedTransaction>, SyncError>;

    /// Payouts that link the given payment or refund.
    async fn payouts_linking(
        &self,
        kind: RecordKind,
        id: Uuid,
    ) -> Result<Vec<PayoutId>, SyncError>;

    /// Loads the owning user's counterparty data.
    async fn load_customer(&self, user_id: UserId) -> Result<Option<Customer>, SyncError>;

    /// Stores the external customer id unless one is already set.
    ///
    /// Returns the id now stored, which is the earlier one if another
    /// attempt got there first.
    async fn claim_customer_ref(
        &self,
        user_id: UserId,
        external_id: &str,
    ) -> Result<String, SyncError>;

    /// Current sync state of a record.
    async fn load_sync_state(
        &self,
        kind: RecordKind,
        id: Uuid,
    ) -> Result<Option<SyncState>, SyncError>;

    /// Transitions `pending`/`failed` to `synced`, clearing `sync_error`.
    async fn mark_synced(
        &self,
        kind: RecordKind,
        id: Uuid,
        external_id: &str,
        response: &Value,
        at: DateTime<Utc>,
    ) -> Result<SyncWrite, SyncError>;

    /// Transitions `pending`/`failed` to `failed` with the given detail.
    async fn mark_failed(
        &self,
        kind: RecordKind,
        id: Uuid,
        error: &Value,
        at: DateTime<Utc>,
    ) -> Result<SyncWrite, SyncError>;

    /// Moves `failed` back to `pending`. Returns false if the record was
    /// not failed.
    async fn reset_failed(&self, kind: RecordKind, id: Uuid) -> Result<bool, SyncError>;

    /// Failed records of a kind, most recent attempt first, with the total.
    async fn list_failed(
        &self,
        kind: RecordKind,
        page: &PageRequest,
    ) -> Result<(Vec<FailedRecord>, u64), SyncError>;
}
