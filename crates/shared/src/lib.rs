//! Shared types, errors, and configuration for Ledgersync.
//!
//! This crate provides common types used across all other crates:
//! - Money in integer minor units with ISO currency codes
//! - Typed IDs for payments, refunds, payouts and users
//! - Pagination types for list endpoints
//! - Application-wide error types
//! - Configuration management

pub mod config;
pub mod error;
pub mod types;

pub use config::{AccountingConfig, AppConfig, SyncConfig};
pub use error::{AppError, AppResult};
