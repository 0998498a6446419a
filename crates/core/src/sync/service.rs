//! Per-record sync state machine.
//!
//! Each entry point re-reads the record, returns the stored result if it is
//! already synced, and otherwise builds and creates the external document.
//! Outcomes are written back with conditional updates so that concurrent
//! attempts for the same record produce at most one effective write.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use ledgersync_shared::config::SyncConfig;
use ledgersync_shared::types::{PageRequest, PageResponse, PaymentId, PayoutId, RefundId, UserId};

use super::cascade::CascadeReport;
use super::store::{SyncStore, SyncWrite};
use crate::builder::{RepresentationBuilder, ResolvedLine};
use crate::client::{AccountingClient, CustomerParams, ExternalDocument, Ref};
use crate::error::SyncError;
use crate::payout::PayoutAggregator;
use crate::record::{FailedRecord, Payment, Payout, RecordKind, Refund, SyncState};
use crate::resolver::{LookupCache, Resolver};

/// Result of a sync entry point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncOutcome {
    /// Record kind.
    pub kind: RecordKind,
    /// Record ID.
    pub id: Uuid,
    /// External document id.
    pub external_id: String,
    /// Raw response of the call that created the document.
    pub response: Option<Value>,
    /// True if no document was created by this call.
    pub already_synced: bool,
    /// Payouts re-checked after this record synced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cascade: Option<CascadeReport>,
}

impl SyncOutcome {
    fn from_state(kind: RecordKind, id: Uuid, state: &SyncState) -> Result<Self, SyncError> {
        let external_id = state.external_id.clone().ok_or_else(|| {
            SyncError::InvalidRecord(format!("{kind} {id} is synced without an external id"))
        })?;

        Ok(Self {
            kind,
            id,
            external_id,
            response: state.external_response.clone(),
            already_synced: true,
            cascade: None,
        })
    }

    fn created(kind: RecordKind, id: Uuid, document: ExternalDocument) -> Self {
        Self {
            kind,
            id,
            external_id: document.id,
            response: Some(document.raw),
            already_synced: false,
            cascade: None,
        }
    }
}

/// Sync engine entry points.
pub struct SyncService {
    pub(super) store: Arc<dyn SyncStore>,
    client: Arc<dyn AccountingClient>,
    resolver: Resolver,
}

impl SyncService {
    /// Creates a service with an injected lookup cache.
    #[must_use]
    pub fn new(
        store: Arc<dyn SyncStore>,
        client: Arc<dyn AccountingClient>,
        config: SyncConfig,
        cache: LookupCache,
    ) -> Self {
        let resolver = Resolver::new(client.clone(), config, cache);
        Self {
            store,
            client,
            resolver,
        }
    }

    /// The resolver used for account/class/item lookups.
    #[must_use]
    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Runs the entry point for a record kind.
    pub async fn sync(&self, kind: RecordKind, id: Uuid) -> Result<SyncOutcome, SyncError> {
        match kind {
            RecordKind::Payment => self.sync_payment(PaymentId(id)).await,
            RecordKind::Refund => self.sync_refund(RefundId(id)).await,
            RecordKind::Payout => self.sync_payout(PayoutId(id)).await,
        }
    }

    /// Mirrors a payment as a sales receipt, then re-checks linked payouts.
    ///
    /// # Errors
    ///
    /// Any [`SyncError`]; failures tied to the record are also persisted.
    pub async fn sync_payment(&self, id: PaymentId) -> Result<SyncOutcome, SyncError> {
        let kind = RecordKind::Payment;
        let payment = self
            .store
            .load_payment(id)
            .await?
            .ok_or(SyncError::NotFound { kind, id: id.0 })?;

        if payment.sync.is_synced() {
            debug!(kind = %kind, id = %id, "Record already synced");
            return SyncOutcome::from_state(kind, id.0, &payment.sync);
        }

        let result = self.create_sales_receipt(&payment).await;
        self.finish_with_cascade(kind, id.0, result).await
    }

    /// Mirrors a refund as a refund receipt, then re-checks linked payouts.
    ///
    /// # Errors
    ///
    /// Any [`SyncError`]; failures tied to the record are also persisted.
    pub async fn sync_refund(&self, id: RefundId) -> Result<SyncOutcome, SyncError> {
        let kind = RecordKind::Refund;
        let refund = self
            .store
            .load_refund(id)
            .await?
            .ok_or(SyncError::NotFound { kind, id: id.0 })?;

        if refund.sync.is_synced() {
            debug!(kind = %kind, id = %id, "Record already synced");
            return SyncOutcome::from_state(kind, id.0, &refund.sync);
        }

        let result = self.create_refund_receipt(&refund).await;
        self.finish_with_cascade(kind, id.0, result).await
    }

    /// Mirrors a payout as a bank deposit once all linked transactions are
    /// synced.
    ///
    /// # Errors
    ///
    /// `TransactionsNotFullySynced` while any linked payment or refund is
    /// unsynced; otherwise any [`SyncError`].
    pub async fn sync_payout(&self, id: PayoutId) -> Result<SyncOutcome, SyncError> {
        let kind = RecordKind::Payout;
        let payout = self
            .store
            .load_payout(id)
            .await?
            .ok_or(SyncError::NotFound { kind, id: id.0 })?;

        if payout.sync.is_synced() {
            debug!(kind = %kind, id = %id, "Record already synced");
            return SyncOutcome::from_state(kind, id.0, &payout.sync);
        }

        let result = self.create_deposit(&payout).await;
        self.finish(kind, id.0, result).await
    }

    /// Resets a failed record to pending and runs its entry point.
    ///
    /// Records that are not failed are run as they are.
    pub async fn retry(&self, kind: RecordKind, id: Uuid) -> Result<SyncOutcome, SyncError> {
        if self.store.reset_failed(kind, id).await? {
            info!(kind = %kind, id = %id, "Failed record reset to pending");
        }
        self.sync(kind, id).await
    }

    /// Current sync state of a record.
    pub async fn sync_state(&self, kind: RecordKind, id: Uuid) -> Result<SyncState, SyncError> {
        self.store
            .load_sync_state(kind, id)
            .await?
            .ok_or(SyncError::NotFound { kind, id })
    }

    /// Failed records of a kind with their last error.
    pub async fn failures(
        &self,
        kind: RecordKind,
        page: &PageRequest,
    ) -> Result<PageResponse<FailedRecord>, SyncError> {
        let (data, total) = self.store.list_failed(kind, page).await?;
        Ok(PageResponse::new(data, page.page, page.per_page, total))
    }

    async fn create_sales_receipt(&self, payment: &Payment) -> Result<ExternalDocument, SyncError> {
        let components = payment.line_components()?;

        let mut lines = Vec::with_capacity(components.len());
        for component in components {
            let class = self.resolver.resolve_class(&component.classification).await?;
            let item = self
                .resolver
                .resolve_item(&component.classification, RecordKind::Payment)
                .await?;
            lines.push(ResolvedLine {
                amount_minor: component.amount_minor,
                item,
                class,
                description: component.description,
            });
        }

        let deposit_to = self
            .resolver
            .resolve_account(&self.resolver.config().undeposited_funds_account)
            .await?;
        let customer = self.customer_ref(payment.user_id).await?;

        let receipt = RepresentationBuilder::sales_receipt(payment, customer, deposit_to, &lines)?;
        Ok(self.client.create_sales_receipt(&receipt).await?)
    }

    async fn create_refund_receipt(&self, refund: &Refund) -> Result<ExternalDocument, SyncError> {
        let origin = self
            .store
            .load_payment(refund.payment_id)
            .await?
            .ok_or_else(|| {
                SyncError::InvalidRecord(format!(
                    "refund {} references missing payment {}",
                    refund.id, refund.payment_id
                ))
            })?;

        let component = refund.line_component(&origin)?;
        let class = self.resolver.resolve_class(&component.classification).await?;
        let item = self
            .resolver
            .resolve_item(&component.classification, RecordKind::Refund)
            .await?;
        let line = ResolvedLine {
            amount_minor: component.amount_minor,
            item,
            class,
            description: component.description,
        };

        let refund_from = self
            .resolver
            .resolve_account(&self.resolver.config().refund_from_account)
            .await?;
        let customer = self.customer_ref(origin.user_id).await?;

        let receipt =
            RepresentationBuilder::refund_receipt(refund, &origin, customer, refund_from, &line)?;
        Ok(self.client.create_refund_receipt(&receipt).await?)
    }

    async fn create_deposit(&self, payout: &Payout) -> Result<ExternalDocument, SyncError> {
        let links = self.store.linked_transactions(payout.id).await?;

        if let Err(err) = PayoutAggregator::ensure_all_synced(payout.id, &links) {
            warn!(payout_id = %payout.id, error = %err, "Payout waiting on linked transactions");
            return Err(err);
        }

        let config = self.resolver.config();
        let deposit_to = self.resolver.resolve_account(&config.deposit_account).await?;
        let clearing = self
            .resolver
            .resolve_account(&config.undeposited_funds_account)
            .await?;

        let fee = if PayoutAggregator::wants_fee_line(payout, &links) {
            self.resolver.resolve_fee_line().await
        } else {
            None
        };

        let deposit =
            PayoutAggregator::build_deposit(payout, &links, &deposit_to, &clearing, fee.as_ref())?;
        Ok(self.client.create_deposit(&deposit).await?)
    }

    /// External customer for a user, created on first use.
    ///
    /// If another attempt stored a customer id first, that id is used and
    /// the one created here is left unused.
    async fn customer_ref(&self, user_id: UserId) -> Result<Ref, SyncError> {
        let customer = self
            .store
            .load_customer(user_id)
            .await?
            .ok_or(SyncError::UserNotFound(user_id))?;

        if let Some(external_id) = customer.external_customer_id {
            return Ok(Ref::named(external_id, customer.display_name));
        }

        let params = CustomerParams {
            display_name: customer.display_name.clone(),
            email: customer.email,
        };
        let created = self.client.create_customer(&params).await?;
        let stored = self.store.claim_customer_ref(user_id, &created).await?;

        if stored == created {
            info!(user_id = %user_id, customer_id = %created, "Created external customer");
        } else {
            warn!(
                user_id = %user_id,
                orphan = %created,
                customer_id = %stored,
                "External customer already set by a concurrent attempt"
            );
        }

        Ok(Ref::named(stored, customer.display_name))
    }

    async fn finish_with_cascade(
        &self,
        kind: RecordKind,
        id: Uuid,
        result: Result<ExternalDocument, SyncError>,
    ) -> Result<SyncOutcome, SyncError> {
        let mut outcome = self.finish(kind, id, result).await?;
        if !outcome.already_synced {
            outcome.cascade = Some(self.cascade_from(kind, id).await);
        }
        Ok(outcome)
    }

    /// Writes the outcome of an attempt back to the record.
    async fn finish(
        &self,
        kind: RecordKind,
        id: Uuid,
        result: Result<ExternalDocument, SyncError>,
    ) -> Result<SyncOutcome, SyncError> {
        let document = match result {
            Ok(document) => document,
            Err(err) => {
                self.record_failure(kind, id, &err).await;
                return Err(err);
            }
        };

        match self
            .store
            .mark_synced(kind, id, &document.id, &document.raw, Utc::now())
            .await?
        {
            SyncWrite::Applied => {
                info!(
                    kind = %kind,
                    id = %id,
                    external_id = %document.id,
                    "Record synced"
                );
                Ok(SyncOutcome::created(kind, id, document))
            }
            SyncWrite::AlreadySynced(state) => {
                warn!(
                    kind = %kind,
                    id = %id,
                    discarded = %document.id,
                    "Record synced by a concurrent attempt, discarding this result"
                );
                SyncOutcome::from_state(kind, id, &state)
            }
        }
    }

    async fn record_failure(&self, kind: RecordKind, id: Uuid, err: &SyncError) {
        error!(
            kind = %kind,
            id = %id,
            code = err.error_code(),
            error = %err,
            "Failed to sync record"
        );

        if !err.is_persisted() {
            return;
        }

        match self
            .store
            .mark_failed(kind, id, &err.failure_detail(), Utc::now())
            .await
        {
            Ok(SyncWrite::Applied) => {}
            Ok(SyncWrite::AlreadySynced(_)) => {
                debug!(kind = %kind, id = %id, "Record already synced, failure not recorded");
            }
            Err(store_err) => {
                error!(kind = %kind, id = %id, error = %store_err, "Failed to persist sync failure");
            }
        }
    }
}
