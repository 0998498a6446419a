//! Record and sync-state types.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use ledgersync_shared::types::{Currency, Money, PaymentId, PayoutId, RefundId, UserId};

use crate::error::SyncError;

/// Kind of ledger record that can be mirrored externally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    /// Incoming payment, reported as a sales receipt.
    Payment,
    /// Refund of a payment, reported as a refund receipt.
    Refund,
    /// Processor payout, reported as a bank deposit.
    Payout,
}

impl RecordKind {
    /// Returns the string representation of the kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Payment => "payment",
            Self::Refund => "refund",
            Self::Payout => "payout",
        }
    }

    /// Parses a kind from a string. Accepts singular and plural forms.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "payment" | "payments" => Some(Self::Payment),
            "refund" | "refunds" => Some(Self::Refund),
            "payout" | "payouts" => Some(Self::Payout),
            _ => None,
        }
    }

    /// External document type created for this kind.
    #[must_use]
    pub fn document_type(&self) -> &'static str {
        match self {
            Self::Payment => "SalesReceipt",
            Self::Refund => "RefundReceipt",
            Self::Payout => "Deposit",
        }
    }

    /// Maps an external document type back to a record kind.
    pub fn from_document_type(document_type: &str) -> Option<Self> {
        match document_type {
            "SalesReceipt" => Some(Self::Payment),
            "RefundReceipt" => Some(Self::Refund),
            "Deposit" => Some(Self::Payout),
            _ => None,
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Sync status of a record.
///
/// Valid transitions:
/// - Pending → Synced (success)
/// - Pending/Failed → Failed (any error)
/// - Failed → Pending (manual retry)
///
/// Synced is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Not yet mirrored externally.
    Pending,
    /// Mirrored; the external id is known.
    Synced,
    /// Last attempt failed; the error is stored on the record.
    Failed,
}

impl SyncStatus {
    /// Returns the string representation of the status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Synced => "synced",
            Self::Failed => "failed",
        }
    }

    /// Parses a status from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "synced" => Some(Self::Synced),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns true once the record is mirrored externally.
    #[must_use]
    pub fn is_synced(&self) -> bool {
        matches!(self, Self::Synced)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Sync bookkeeping carried by every record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    /// Current status.
    pub status: SyncStatus,
    /// External document id; present exactly when synced.
    pub external_id: Option<String>,
    /// Last raw response from the accounting API, kept verbatim.
    pub external_response: Option<Value>,
    /// Last structured failure; cleared on success.
    pub sync_error: Option<Value>,
    /// When the last attempt was made.
    pub last_sync_attempt_at: Option<DateTime<Utc>>,
    /// When the record reached `synced`.
    pub synced_at: Option<DateTime<Utc>>,
}

impl SyncState {
    /// Fresh state for a newly created record.
    #[must_use]
    pub fn pending() -> Self {
        Self {
            status: SyncStatus::Pending,
            external_id: None,
            external_response: None,
            sync_error: None,
            last_sync_attempt_at: None,
            synced_at: None,
        }
    }

    /// State of a record already mirrored as `external_id`.
    #[must_use]
    pub fn synced(external_id: impl Into<String>, synced_at: DateTime<Utc>) -> Self {
        Self {
            status: SyncStatus::Synced,
            external_id: Some(external_id.into()),
            external_response: None,
            sync_error: None,
            last_sync_attempt_at: Some(synced_at),
            synced_at: Some(synced_at),
        }
    }

    /// Returns true if the record is synced.
    #[must_use]
    pub fn is_synced(&self) -> bool {
        self.status.is_synced()
    }
}

impl Default for SyncState {
    fn default() -> Self {
        Self::pending()
    }
}

/// Business classification used only for account/class resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Classification {
    /// Business entity type (`event`, `donation`, `membership`, `booking`, ...).
    pub entity_type: String,
    /// Optional sub-scope such as a physical property.
    pub property: Option<String>,
}

impl Classification {
    /// Classification without a property.
    #[must_use]
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            property: None,
        }
    }

    /// Classification scoped to a property.
    #[must_use]
    pub fn with_property(entity_type: impl Into<String>, property: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            property: Some(property.into()),
        }
    }
}

/// One business category within a payment (e.g. tickets plus a donation).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineComponent {
    /// Classification of this part of the payment.
    pub classification: Classification,
    /// Amount of this part in minor units.
    pub amount_minor: i64,
    /// Optional line description.
    pub description: Option<String>,
}

/// An incoming payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    /// Payment ID.
    pub id: PaymentId,
    /// User who paid; owns the external customer.
    pub user_id: UserId,
    /// Total amount (non-negative).
    pub amount: Money,
    /// Primary classification, inherited by refunds.
    pub classification: Classification,
    /// Sub-components; empty means a single component for the whole amount.
    pub components: Vec<LineComponent>,
    /// Free-text description.
    pub description: Option<String>,
    /// Payment processor reference (e.g. charge id).
    pub processor_reference: Option<String>,
    /// Transaction date.
    pub txn_date: NaiveDate,
    /// Sync bookkeeping.
    pub sync: SyncState,
}

impl Payment {
    /// Returns the components to report, one per external line.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::InvalidRecord` if the amount is negative, a
    /// component is not positive, or components do not sum to the amount.
    pub fn line_components(&self) -> Result<Vec<LineComponent>, SyncError> {
        if self.amount.is_negative() {
            return Err(SyncError::InvalidRecord(format!(
                "payment {} has a negative amount",
                self.id
            )));
        }

        if self.components.is_empty() {
            return Ok(vec![LineComponent {
                classification: self.classification.clone(),
                amount_minor: self.amount.minor_units,
                description: self.description.clone(),
            }]);
        }

        if self.components.iter().any(|c| c.amount_minor <= 0) {
            return Err(SyncError::InvalidRecord(format!(
                "payment {} has a non-positive component",
                self.id
            )));
        }

        let component_total = self
            .components
            .iter()
            .try_fold(0i64, |acc, c| acc.checked_add(c.amount_minor))
            .ok_or_else(|| {
                SyncError::InvalidRecord(format!(
                    "payment {} components overflow the amount range",
                    self.id
                ))
            })?;
        if component_total != self.amount.minor_units {
            return Err(SyncError::InvalidRecord(format!(
                "payment {} components sum to {} but amount is {}",
                self.id, component_total, self.amount.minor_units
            )));
        }

        Ok(self.components.clone())
    }
}

/// A refund of a payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Refund {
    /// Refund ID.
    pub id: RefundId,
    /// Originating payment.
    pub payment_id: PaymentId,
    /// Refunded amount, stored as a positive magnitude.
    pub amount: Money,
    /// Explicit entity type; inherited from the payment when absent.
    pub entity_type: Option<String>,
    /// Explicit property; inherited from the payment when absent.
    pub property: Option<String>,
    /// Reason given for the refund.
    pub reason: Option<String>,
    /// Payment processor reference (e.g. refund id).
    pub processor_reference: Option<String>,
    /// Transaction date.
    pub txn_date: NaiveDate,
    /// Sync bookkeeping.
    pub sync: SyncState,
}

impl Refund {
    /// Classification used for the refund line.
    ///
    /// An absent entity type is taken from the originating payment's
    /// primary classification. An absent property is inherited only when
    /// the effective entity type matches the payment's, so a refund
    /// reclassified to another entity type never picks up a property
    /// that belongs to a different category.
    #[must_use]
    pub fn effective_classification(&self, origin: &Payment) -> Classification {
        let entity_type = self
            .entity_type
            .clone()
            .unwrap_or_else(|| origin.classification.entity_type.clone());

        let property = match &self.property {
            Some(property) => Some(property.clone()),
            None if entity_type == origin.classification.entity_type => {
                origin.classification.property.clone()
            }
            None => None,
        };

        Classification {
            entity_type,
            property,
        }
    }

    /// The single line component reported for this refund.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::InvalidRecord` for a zero amount or a currency
    /// that differs from the originating payment.
    pub fn line_component(&self, origin: &Payment) -> Result<LineComponent, SyncError> {
        if self.amount.is_zero() {
            return Err(SyncError::InvalidRecord(format!(
                "refund {} has a zero amount",
                self.id
            )));
        }
        if self.amount.currency != origin.amount.currency {
            return Err(SyncError::InvalidRecord(format!(
                "refund {} currency {} differs from payment currency {}",
                self.id, self.amount.currency, origin.amount.currency
            )));
        }

        Ok(LineComponent {
            classification: self.effective_classification(origin),
            amount_minor: self.amount.minor_units.abs(),
            description: self.reason.clone(),
        })
    }
}

/// A processor payout settling a set of payments and refunds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payout {
    /// Payout ID.
    pub id: PayoutId,
    /// Net amount deposited, as recorded by the processor.
    pub amount: Money,
    /// Aggregate processor fees in minor units.
    pub fee_total_minor: i64,
    /// Payment processor reference (e.g. payout id).
    pub processor_reference: Option<String>,
    /// Date the funds arrived.
    pub arrival_date: NaiveDate,
    /// Sync bookkeeping.
    pub sync: SyncState,
}

/// A payment or refund linked to a payout, with its current sync state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedTransaction {
    /// `Payment` or `Refund`.
    pub kind: RecordKind,
    /// Record ID.
    pub id: Uuid,
    /// Record amount in minor units (positive magnitude).
    pub amount_minor: i64,
    /// Currency of the record amount.
    pub currency: Currency,
    /// Current sync status.
    pub status: SyncStatus,
    /// External document id once synced.
    pub external_id: Option<String>,
}

/// The owning user's counterparty data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    /// User ID.
    pub user_id: UserId,
    /// Display name used for the external customer.
    pub display_name: String,
    /// Email address.
    pub email: Option<String>,
    /// External customer id once created.
    pub external_customer_id: Option<String>,
}

/// A failed record with its last error, for operator listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedRecord {
    /// Record kind.
    pub kind: RecordKind,
    /// Record ID.
    pub id: Uuid,
    /// Last structured failure.
    pub sync_error: Option<Value>,
    /// When the failing attempt was made.
    pub last_sync_attempt_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgersync_shared::types::Currency;

    fn payment(amount: i64, components: Vec<LineComponent>) -> Payment {
        Payment {
            id: PaymentId::new(),
            user_id: UserId::new(),
            amount: Money::new(amount, Currency::Usd),
            classification: Classification::with_property("booking", "tahoe"),
            components,
            description: Some("Cabin booking".to_string()),
            processor_reference: None,
            txn_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            sync: SyncState::pending(),
        }
    }

    fn component(entity_type: &str, amount_minor: i64) -> LineComponent {
        LineComponent {
            classification: Classification::new(entity_type),
            amount_minor,
            description: None,
        }
    }

    fn refund(entity_type: Option<&str>, property: Option<&str>) -> Refund {
        Refund {
            id: RefundId::new(),
            payment_id: PaymentId::new(),
            amount: Money::new(5000, Currency::Usd),
            entity_type: entity_type.map(String::from),
            property: property.map(String::from),
            reason: None,
            processor_reference: None,
            txn_date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            sync: SyncState::pending(),
        }
    }

    #[test]
    fn test_kind_parse_and_document_type() {
        assert_eq!(RecordKind::parse("payments"), Some(RecordKind::Payment));
        assert_eq!(RecordKind::parse("Refund"), Some(RecordKind::Refund));
        assert_eq!(RecordKind::parse("invoice"), None);
        assert_eq!(RecordKind::Refund.document_type(), "RefundReceipt");
        assert_eq!(
            RecordKind::from_document_type("Deposit"),
            Some(RecordKind::Payout)
        );
    }

    #[test]
    fn test_status_round_trip() {
        for status in [SyncStatus::Pending, SyncStatus::Synced, SyncStatus::Failed] {
            assert_eq!(SyncStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(SyncStatus::parse("done"), None);
        assert_eq!(format!("{}", SyncStatus::Synced), "synced");
    }

    #[test]
    fn test_empty_components_use_whole_payment() {
        let p = payment(10000, vec![]);
        let lines = p.line_components().unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].amount_minor, 10000);
        assert_eq!(lines[0].classification, p.classification);
    }

    #[test]
    fn test_components_must_sum_to_amount() {
        let p = payment(10000, vec![component("event", 8000), component("donation", 1000)]);
        assert!(matches!(
            p.line_components(),
            Err(SyncError::InvalidRecord(_))
        ));

        let p = payment(10000, vec![component("event", 8000), component("donation", 2000)]);
        assert_eq!(p.line_components().unwrap().len(), 2);
    }

    #[test]
    fn test_component_overflow_is_invalid_record() {
        let p = payment(
            10,
            vec![
                component("event", i64::MAX),
                component("donation", i64::MAX),
                component("event", 12),
            ],
        );
        match p.line_components() {
            Err(SyncError::InvalidRecord(msg)) => assert!(msg.contains("overflow")),
            other => panic!("expected invalid record, got {other:?}"),
        }
    }

    #[test]
    fn test_refund_inherits_payment_classification() {
        let origin = payment(10000, vec![]);
        let r = refund(None, None);
        assert_eq!(
            r.effective_classification(&origin),
            Classification::with_property("booking", "tahoe")
        );
    }

    #[test]
    fn test_refund_explicit_fields_win_independently() {
        let origin = payment(10000, vec![]);

        let r = refund(Some("donation"), None);
        assert_eq!(
            r.effective_classification(&origin),
            Classification::new("donation")
        );

        let r = refund(Some("booking"), None);
        assert_eq!(
            r.effective_classification(&origin),
            Classification::with_property("booking", "tahoe")
        );

        let r = refund(None, Some("clear_lake"));
        assert_eq!(
            r.effective_classification(&origin),
            Classification::with_property("booking", "clear_lake")
        );
    }

    #[test]
    fn test_refund_currency_must_match_payment() {
        let origin = payment(10000, vec![]);
        let mut r = refund(None, None);
        r.amount = Money::new(5000, Currency::Eur);
        assert!(matches!(
            r.line_component(&origin),
            Err(SyncError::InvalidRecord(_))
        ));
    }
}
