//! QuickBooks-style REST client implementing
//! [`ledgersync_core::client::AccountingClient`].
//!
//! Authentication is a pre-issued bearer token; refreshing it is the job
//! of whatever process writes it into configuration.

mod client;
mod fault;

pub use client::QboClient;
