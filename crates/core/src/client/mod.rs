//! Accounting API capability.
//!
//! The engine depends only on [`AccountingClient`]; the HTTP
//! implementation lives in `ledgersync-accounting` and tests use
//! [`memory::InMemoryAccounting`].

pub mod document;
pub mod memory;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub use document::{
    CustomerParams, Deposit, DepositLineDetail, DetailType, ExternalDocument, ItemOptions, Line,
    LinkedTxn, Ref, RefundReceipt, SalesItemLineDetail, SalesReceipt,
};
pub use memory::InMemoryAccounting;

/// Errors returned by an accounting API implementation.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// The API answered with a non-success status.
    #[error("request rejected with status {status}: {message}")]
    Rejected {
        /// HTTP status.
        status: u16,
        /// Fault message extracted from the body.
        message: String,
        /// Raw fault body.
        detail: Option<Value>,
    },

    /// The request could not be sent or the connection failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// No response within the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// The response body did not have the expected shape.
    #[error("unexpected response: {0}")]
    Decode(String),
}

/// Operations the sync engine needs from the external accounting system.
///
/// Every call is a single blocking round trip from the caller's point of
/// view; none is retried internally.
#[async_trait]
pub trait AccountingClient: Send + Sync {
    /// Creates a customer and returns its external id.
    async fn create_customer(&self, params: &CustomerParams) -> Result<String, ClientError>;

    /// Creates a sales receipt.
    async fn create_sales_receipt(
        &self,
        receipt: &SalesReceipt,
    ) -> Result<ExternalDocument, ClientError>;

    /// Creates a refund receipt.
    async fn create_refund_receipt(
        &self,
        receipt: &RefundReceipt,
    ) -> Result<ExternalDocument, ClientError>;

    /// Creates a bank deposit.
    async fn create_deposit(&self, deposit: &Deposit) -> Result<ExternalDocument, ClientError>;

    /// Looks up an account id by exact name.
    async fn query_account_by_name(&self, name: &str) -> Result<Option<String>, ClientError>;

    /// Looks up a class id by exact name.
    async fn query_class_by_name(&self, name: &str) -> Result<Option<String>, ClientError>;

    /// Returns the id of the item with this name, creating it if absent.
    async fn get_or_create_item(
        &self,
        name: &str,
        options: &ItemOptions,
    ) -> Result<String, ClientError>;
}
