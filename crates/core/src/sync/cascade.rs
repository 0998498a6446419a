//! Payout re-checks after a payment or refund syncs.

use serde::Serialize;
use tracing::{debug, error};
use uuid::Uuid;

use ledgersync_shared::types::PayoutId;

use super::service::SyncService;
use crate::error::SyncError;
use crate::record::RecordKind;

/// What happened to each payout re-checked by a cascade.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CascadeReport {
    /// Payouts now synced, including ones that already were.
    pub synced: Vec<PayoutId>,
    /// Payouts still waiting on other linked transactions.
    pub waiting: Vec<PayoutId>,
    /// Payouts whose sync failed for another reason.
    pub failed: Vec<PayoutId>,
}

impl CascadeReport {
    /// Returns true if no payout was re-checked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.synced.is_empty() && self.waiting.is_empty() && self.failed.is_empty()
    }
}

impl SyncService {
    /// Attempts to sync every payout that links the given payment or refund.
    ///
    /// Payouts are attempted one after another. A payout still waiting on
    /// other transactions is expected and only reported. Only payout syncs
    /// are started here, never payment or refund syncs.
    pub async fn cascade_from(&self, kind: RecordKind, id: Uuid) -> CascadeReport {
        let mut report = CascadeReport::default();

        if kind == RecordKind::Payout {
            return report;
        }

        let payouts = match self.store.payouts_linking(kind, id).await {
            Ok(payouts) => payouts,
            Err(err) => {
                error!(kind = %kind, id = %id, error = %err, "Failed to find linked payouts");
                return report;
            }
        };

        for payout_id in payouts {
            match self.sync_payout(payout_id).await {
                Ok(_) => report.synced.push(payout_id),
                Err(SyncError::TransactionsNotFullySynced { unsynced, .. }) => {
                    debug!(
                        payout_id = %payout_id,
                        unsynced,
                        "Payout still waiting after cascade"
                    );
                    report.waiting.push(payout_id);
                }
                Err(_) => report.failed.push(payout_id),
            }
        }

        report
    }
}
