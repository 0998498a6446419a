//! Ledger records as seen by the sync engine.
//!
//! Payments, refunds and payouts are created by the domain layer and are
//! immutable apart from their [`SyncState`], which only the sync engine writes.

pub mod types;

pub use types::{
    Classification, Customer, FailedRecord, LineComponent, LinkedTransaction, Payment, Payout,
    RecordKind, Refund, SyncState, SyncStatus,
};
