//! Ledger-to-external-accounting synchronization engine.
//!
//! This crate contains the sync logic with ZERO web or database dependencies.
//! Persistence and the accounting API are reached through the
//! [`sync::SyncStore`] and [`client::AccountingClient`] capability traits.
//!
//! # Modules
//!
//! - `amount` - Minor-unit to decimal-string normalization
//! - `record` - Payments, refunds, payouts and their sync state
//! - `client` - Accounting API capability trait and request shapes
//! - `resolver` - Account/class/item resolution with lookup caching
//! - `builder` - Sales receipt and refund receipt construction
//! - `payout` - Deposit aggregation for payouts
//! - `sync` - Per-record state machine and payout cascade
//! - `webhook` - Entity-change notification parsing and deduplication

pub mod amount;
pub mod builder;
pub mod client;
pub mod error;
pub mod payout;
pub mod record;
pub mod resolver;
pub mod sync;
pub mod webhook;

#[cfg(test)]
mod builder_props;

pub use error::{ErrorCategory, SyncError};
pub use sync::{CascadeReport, SyncOutcome, SyncService, SyncStore};
