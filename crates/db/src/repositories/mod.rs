//! Repository abstractions for data access.
//!
//! Repositories provide a clean interface for database operations,
//! hiding the `SeaORM` implementation details from the sync engine.

pub mod sync;
pub mod webhook;

pub use sync::SyncRepository;
pub use webhook::WebhookEventRepository;

use ledgersync_core::SyncError;
use sea_orm::DbErr;
use tracing::error;

pub(crate) fn store_error(err: DbErr) -> SyncError {
    error!(error = %err, "Database operation failed");
    SyncError::Store(err.to_string())
}
