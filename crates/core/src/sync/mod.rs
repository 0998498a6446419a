//! Sync orchestration.
//!
//! - `service` - entry points per record kind, retry and queries
//! - `cascade` - payout re-checks after a payment or refund syncs
//! - `store` - persistence capability
//! - `memory` - in-memory store

pub mod cascade;
pub mod memory;
pub mod service;
pub mod store;


pub use cascade::CascadeReport;
pub use memory::InMemoryStore;
pub use service::{SyncOutcome, SyncService};
pub use store::{SyncStore, SyncWrite};
