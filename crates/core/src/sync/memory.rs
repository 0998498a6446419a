//! In-memory record store.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use ledgersync_shared::types::{PageRequest, PaymentId, PayoutId, RefundId, UserId};
use ledgersync_shared::{AppError, AppResult};

use super::store::{SyncStore, SyncWrite};
use crate::error::SyncError;
use crate::record::{
    Customer, FailedRecord, LinkedTransaction, Payment, Payout, RecordKind, Refund, SyncState,
    SyncStatus,
};

#[derive(Default)]
struct State {
    customers: HashMap<UserId, Customer>,
    payments: HashMap<PaymentId, Payment>,
    refunds: HashMap<RefundId, Refund>,
    payouts: HashMap<PayoutId, Payout>,
    /// (payout, kind, transaction) in link order.
    links: Vec<(PayoutId, RecordKind, Uuid)>,
}

impl State {
    fn sync_state(&self, kind: RecordKind, id: Uuid) -> Option<&SyncState> {
        match kind {
            RecordKind::Payment => self.payments.get(&PaymentId(id)).map(|r| &r.sync),
            RecordKind::Refund => self.refunds.get(&RefundId(id)).map(|r| &r.sync),
            RecordKind::Payout => self.payouts.get(&PayoutId(id)).map(|r| &r.sync),
        }
    }

    fn sync_state_mut(&mut self, kind: RecordKind, id: Uuid) -> Option<&mut SyncState> {
        match kind {
            RecordKind::Payment => self.payments.get_mut(&PaymentId(id)).map(|r| &mut r.sync),
            RecordKind::Refund => self.refunds.get_mut(&RefundId(id)).map(|r| &mut r.sync),
            RecordKind::Payout => self.payouts.get_mut(&PayoutId(id)).map(|r| &mut r.sync),
        }
    }

    fn linked(&self, kind: RecordKind, id: Uuid) -> Option<LinkedTransaction> {
        let (amount, sync) = match kind {
            RecordKind::Payment => {
                let p = self.payments.get(&PaymentId(id))?;
                (p.amount, &p.sync)
            }
            RecordKind::Refund => {
                let r = self.refunds.get(&RefundId(id))?;
                (r.amount, &r.sync)
            }
            RecordKind::Payout => return None,
        };
        Some(LinkedTransaction {
            kind,
            id,
            amount_minor: amount.minor_units.abs(),
            currency: amount.currency,
            status: sync.status,
            external_id: sync.external_id.clone(),
        })
    }
}

/// [`SyncStore`] held entirely in memory.
///
/// Every operation takes a single lock, so conditional writes are atomic.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds or replaces a customer.
    pub fn insert_customer(&self, customer: Customer) {
        self.lock().customers.insert(customer.user_id, customer);
    }

    /// Adds or replaces a payment.
    pub fn insert_payment(&self, payment: Payment) {
        self.lock().payments.insert(payment.id, payment);
    }

    /// Adds or replaces a refund.
    pub fn insert_refund(&self, refund: Refund) {
        self.lock().refunds.insert(refund.id, refund);
    }

    /// Adds or replaces a payout.
    pub fn insert_payout(&self, payout: Payout) {
        self.lock().payouts.insert(payout.id, payout);
    }

    /// Links a payment or refund to a payout.
    ///
    /// Linking the same pair twice is a no-op.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown payout or transaction, `Validation` when
    /// linking a payout, `Conflict` when the transaction already belongs to
    /// another payout.
    pub fn link_transaction(
        &self,
        payout_id: PayoutId,
        kind: RecordKind,
        transaction_id: Uuid,
    ) -> AppResult<()> {
        let mut state = self.lock();

        if !state.payouts.contains_key(&payout_id) {
            return Err(AppError::NotFound(format!("payout {payout_id}")));
        }
        if kind == RecordKind::Payout {
            return Err(AppError::Validation(
                "only payments and refunds can be linked to a payout".to_string(),
            ));
        }
        if state.linked(kind, transaction_id).is_none() {
            return Err(AppError::NotFound(format!("{kind} {transaction_id}")));
        }

        let existing = state
            .links
            .iter()
            .find(|(_, k, id)| *k == kind && *id == transaction_id)
            .map(|(payout, _, _)| *payout);

        match existing {
            Some(existing) if existing == payout_id => Ok(()),
            Some(existing) => Err(AppError::Conflict(format!(
                "{kind} {transaction_id} is already linked to payout {existing}"
            ))),
            None => {
                state.links.push((payout_id, kind, transaction_id));
                Ok(())
            }
        }
    }

    /// Snapshot of a payment.
    pub fn payment(&self, id: PaymentId) -> Option<Payment> {
        self.lock().payments.get(&id).cloned()
    }

    /// Snapshot of a refund.
    pub fn refund(&self, id: RefundId) -> Option<Refund> {
        self.lock().refunds.get(&id).cloned()
    }

    /// Snapshot of a payout.
    pub fn payout(&self, id: PayoutId) -> Option<Payout> {
        self.lock().payouts.get(&id).cloned()
    }

    /// Snapshot of a customer.
    pub fn customer(&self, user_id: UserId) -> Option<Customer> {
        self.lock().customers.get(&user_id).cloned()
    }
}

#[async_trait]
impl SyncStore for InMemoryStore {
    async fn load_payment(&self, id: PaymentId) -> Result<Option<Payment>, SyncError> {
        Ok(self.payment(id))
    }

    async fn load_refund(&self, id: RefundId) -> Result<Option<Refund>, SyncError> {
        Ok(self.refund(id))
    }

    async fn load_payout(&self, id: PayoutId) -> Result<Option<Payout>, SyncError> {
        Ok(self.payout(id))
    }

    async fn linked_transactions(
        &self,
        payout_id: PayoutId,
    ) -> Result<Vec<LinkedTransaction>, SyncError> {
        let state = self.lock();
        Ok(state
            .links
            .iter()
            .filter(|(payout, _, _)| *payout == payout_id)
            .filter_map(|(_, kind, id)| state.linked(*kind, *id))
            .collect())
    }

    async fn payouts_linking(
        &self,
        kind: RecordKind,
        id: Uuid,
    ) -> Result<Vec<PayoutId>, SyncError> {
        Ok(self
            .lock()
            .links
            .iter()
            .filter(|(_, k, t)| *k == kind && *t == id)
            .map(|(payout, _, _)| *payout)
            .collect())
    }

    async fn load_customer(&self, user_id: UserId) -> Result<Option<Customer>, SyncError> {
        Ok(self.customer(user_id))
    }

    async fn claim_customer_ref(
        &self,
        user_id: UserId,
        external_id: &str,
    ) -> Result<String, SyncError> {
        let mut state = self.lock();
        let customer = state
            .customers
            .get_mut(&user_id)
            .ok_or(SyncError::UserNotFound(user_id))?;

        Ok(customer
            .external_customer_id
            .get_or_insert_with(|| external_id.to_string())
            .clone())
    }

    async fn load_sync_state(
        &self,
        kind: RecordKind,
        id: Uuid,
    ) -> Result<Option<SyncState>, SyncError> {
        Ok(self.lock().sync_state(kind, id).cloned())
    }

    async fn mark_synced(
        &self,
        kind: RecordKind,
        id: Uuid,
        external_id: &str,
        response: &Value,
        at: DateTime<Utc>,
    ) -> Result<SyncWrite, SyncError> {
        let mut state = self.lock();
        let sync = state
            .sync_state_mut(kind, id)
            .ok_or(SyncError::NotFound { kind, id })?;

        if sync.is_synced() {
            return Ok(SyncWrite::AlreadySynced(sync.clone()));
        }

        sync.status = SyncStatus::Synced;
        sync.external_id = Some(external_id.to_string());
        sync.external_response = Some(response.clone());
        sync.sync_error = None;
        sync.last_sync_attempt_at = Some(at);
        sync.synced_at = Some(at);
        Ok(SyncWrite::Applied)
    }

    async fn mark_failed(
        &self,
        kind: RecordKind,
        id: Uuid,
        error: &Value,
        at: DateTime<Utc>,
    ) -> Result<SyncWrite, SyncError> {
        let mut state = self.lock();
        let sync = state
            .sync_state_mut(kind, id)
            .ok_or(SyncError::NotFound { kind, id })?;

        if sync.is_synced() {
            return Ok(SyncWrite::AlreadySynced(sync.clone()));
        }

        sync.status = SyncStatus::Failed;
        sync.sync_error = Some(error.clone());
        sync.last_sync_attempt_at = Some(at);
        Ok(SyncWrite::Applied)
    }

    async fn reset_failed(&self, kind: RecordKind, id: Uuid) -> Result<bool, SyncError> {
        let mut state = self.lock();
        let sync = state
            .sync_state_mut(kind, id)
            .ok_or(SyncError::NotFound { kind, id })?;

        if sync.status != SyncStatus::Failed {
            return Ok(false);
        }
        sync.status = SyncStatus::Pending;
        Ok(true)
    }

    async fn list_failed(
        &self,
        kind: RecordKind,
        page: &PageRequest,
    ) -> Result<(Vec<FailedRecord>, u64), SyncError> {
        let state = self.lock();
        let states: Vec<(Uuid, &SyncState)> = match kind {
            RecordKind::Payment => state.payments.values().map(|r| (r.id.0, &r.sync)).collect(),
            RecordKind::Refund => state.refunds.values().map(|r| (r.id.0, &r.sync)).collect(),
            RecordKind::Payout => state.payouts.values().map(|r| (r.id.0, &r.sync)).collect(),
        };

        let mut failed: Vec<FailedRecord> = states
            .into_iter()
            .filter(|(_, sync)| sync.status == SyncStatus::Failed)
            .map(|(id, sync)| FailedRecord {
                kind,
                id,
                sync_error: sync.sync_error.clone(),
                last_sync_attempt_at: sync.last_sync_attempt_at,
            })
            .collect();
        failed.sort_by(|a, b| {
            b.last_sync_attempt_at
                .cmp(&a.last_sync_attempt_at)
                .then(a.id.cmp(&b.id))
        });

        let total = u64::try_from(failed.len()).unwrap_or(u64::MAX);
        let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
        let limit = usize::try_from(page.limit()).unwrap_or(usize::MAX);
        let data = failed.into_iter().skip(offset).take(limit).collect();
        Ok((data, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Classification;
    use chrono::NaiveDate;
    use ledgersync_shared::types::{Currency, Money};
    use serde_json::json;

    fn payment() -> Payment {
        Payment {
            id: PaymentId::new(),
            user_id: UserId::new(),
            amount: Money::new(10000, Currency::Usd),
            classification: Classification::new("event"),
            components: vec![],
            description: None,
            processor_reference: None,
            txn_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            sync: SyncState::pending(),
        }
    }

    fn payout() -> Payout {
        Payout {
            id: PayoutId::new(),
            amount: Money::new(10000, Currency::Usd),
            fee_total_minor: 0,
            processor_reference: None,
            arrival_date: NaiveDate::from_ymd_opt(2026, 3, 5).unwrap(),
            sync: SyncState::pending(),
        }
    }

    #[tokio::test]
    async fn test_mark_synced_is_conditional() {
        let store = InMemoryStore::new();
        let p = payment();
        let id = p.id.0;
        store.insert_payment(p);

        let first = store
            .mark_synced(RecordKind::Payment, id, "1", &json!({}), Utc::now())
            .await
            .unwrap();
        assert_eq!(first, SyncWrite::Applied);

        let second = store
            .mark_synced(RecordKind::Payment, id, "2", &json!({}), Utc::now())
            .await
            .unwrap();
        match second {
            SyncWrite::AlreadySynced(state) => assert_eq!(state.external_id.as_deref(), Some("1")),
            SyncWrite::Applied => panic!("second write must not apply"),
        }
    }

    #[tokio::test]
    async fn test_mark_failed_never_overwrites_synced() {
        let store = InMemoryStore::new();
        let p = payment();
        let id = p.id.0;
        store.insert_payment(p);

        store
            .mark_synced(RecordKind::Payment, id, "1", &json!({}), Utc::now())
            .await
            .unwrap();
        let write = store
            .mark_failed(RecordKind::Payment, id, &json!({"code": "x"}), Utc::now())
            .await
            .unwrap();
        assert!(matches!(write, SyncWrite::AlreadySynced(_)));

        let state = store
            .load_sync_state(RecordKind::Payment, id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(state.status, SyncStatus::Synced);
        assert!(state.sync_error.is_none());
    }

    #[tokio::test]
    async fn test_reset_failed_only_moves_failed() {
        let store = InMemoryStore::new();
        let p = payment();
        let id = p.id.0;
        store.insert_payment(p);

        assert!(!store.reset_failed(RecordKind::Payment, id).await.unwrap());
        store
            .mark_failed(RecordKind::Payment, id, &json!({}), Utc::now())
            .await
            .unwrap();
        assert!(store.reset_failed(RecordKind::Payment, id).await.unwrap());
        assert_eq!(
            store.payment(PaymentId(id)).unwrap().sync.status,
            SyncStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_claim_customer_ref_keeps_first() {
        let store = InMemoryStore::new();
        let user_id = UserId::new();
        store.insert_customer(Customer {
            user_id,
            display_name: "Ada".into(),
            email: None,
            external_customer_id: None,
        });

        assert_eq!(store.claim_customer_ref(user_id, "C1").await.unwrap(), "C1");
        assert_eq!(store.claim_customer_ref(user_id, "C2").await.unwrap(), "C1");
    }

    #[tokio::test]
    async fn test_link_transaction_rules() {
        let store = InMemoryStore::new();
        let p = payment();
        let first = payout();
        let second = payout();
        let payment_id = p.id.0;
        let (first_id, second_id) = (first.id, second.id);
        store.insert_payment(p);
        store.insert_payout(first);
        store.insert_payout(second);

        store
            .link_transaction(first_id, RecordKind::Payment, payment_id)
            .unwrap();
        store
            .link_transaction(first_id, RecordKind::Payment, payment_id)
            .unwrap();
        assert!(matches!(
            store.link_transaction(second_id, RecordKind::Payment, payment_id),
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            store.link_transaction(first_id, RecordKind::Refund, Uuid::new_v4()),
            Err(AppError::NotFound(_))
        ));

        let links = store.linked_transactions(first_id).await.unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(
            store
                .payouts_linking(RecordKind::Payment, payment_id)
                .await
                .unwrap(),
            vec![first_id]
        );
    }

    #[tokio::test]
    async fn test_list_failed_paginates() {
        let store = InMemoryStore::new();
        for _ in 0..3 {
            let p = payment();
            let id = p.id.0;
            store.insert_payment(p);
            store
                .mark_failed(RecordKind::Payment, id, &json!({"code": "x"}), Utc::now())
                .await
                .unwrap();
        }
        store.insert_payment(payment());

        let (page, total) = store
            .list_failed(RecordKind::Payment, &PageRequest::new(1, 2))
            .await
            .unwrap();
        assert_eq!(total, 3);
        assert_eq!(page.len(), 2);

        let (page, _) = store
            .list_failed(RecordKind::Payment, &PageRequest::new(2, 2))
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
    }
}
