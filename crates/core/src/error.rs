//! Sync error types.
//!
//! Every failure of a sync attempt is one of these variants. They are
//! returned as explicit results and, for failures tied to an existing
//! record, persisted on the record as the JSON produced by
//! [`SyncError::failure_detail`].

use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;
use uuid::Uuid;

use ledgersync_shared::types::{PayoutId, UserId};

use crate::client::ClientError;
use crate::record::RecordKind;
use crate::resolver::LookupKind;

/// Coarse failure taxonomy shared with operators and dashboards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// A required static mapping is absent and no fallback is allowed.
    ConfigurationMissing,
    /// An external account/class/item lookup found nothing.
    ResolutionFailed,
    /// The accounting API rejected or could not process the request.
    ExternalApiError,
    /// A payout is waiting on unsynced linked transactions.
    DependencyNotReady,
    /// The record does not exist.
    NotFound,
    /// The record's own data is inconsistent.
    InvalidRecord,
    /// The record store could not be read or written.
    StoreError,
}

impl ErrorCategory {
    /// Returns the string representation of the category.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConfigurationMissing => "configuration_missing",
            Self::ResolutionFailed => "resolution_failed",
            Self::ExternalApiError => "external_api_error",
            Self::DependencyNotReady => "dependency_not_ready",
            Self::NotFound => "not_found",
            Self::InvalidRecord => "invalid_record",
            Self::StoreError => "store_error",
        }
    }
}

/// Errors that can occur while syncing a record.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    // ========== Mapping Errors ==========
    /// Required static mapping absent and dynamic fallback unavailable.
    #[error("Configuration missing: {0}")]
    ConfigurationMissing(String),

    /// External lookup returned nothing for the given name.
    #[error("Could not resolve {kind} '{name}' in the accounting system")]
    ResolutionFailed {
        /// What was being looked up.
        kind: LookupKind,
        /// Name that was looked up.
        name: String,
    },

    // ========== External API Errors ==========
    /// The accounting API rejected or could not process the request.
    #[error("Accounting API error: {message}")]
    ExternalApi {
        /// HTTP status, when a response was received.
        status: Option<u16>,
        /// Human-readable message.
        message: String,
        /// Raw error payload, when available.
        detail: Option<Value>,
    },

    // ========== Dependency Errors ==========
    /// A payout has linked transactions that are not yet synced.
    #[error("Payout {payout_id} has {unsynced} linked transaction(s) not yet synced")]
    TransactionsNotFullySynced {
        /// The payout.
        payout_id: PayoutId,
        /// Number of linked transactions still unsynced.
        unsynced: usize,
    },

    // ========== Record Errors ==========
    /// The record does not exist.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Record kind.
        kind: RecordKind,
        /// Record ID.
        id: Uuid,
    },

    /// The owning user of a record does not exist.
    #[error("User not found: {0}")]
    UserNotFound(UserId),

    /// The record's data is inconsistent.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    // ========== Store Errors ==========
    /// Persistence failure.
    #[error("Store error: {0}")]
    Store(String),
}

impl SyncError {
    /// Returns the stable error code persisted and returned to callers.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ConfigurationMissing(_) => "configuration_missing",
            Self::ResolutionFailed { .. } => "resolution_failed",
            Self::ExternalApi { .. } => "external_api_error",
            Self::TransactionsNotFullySynced { .. } => "transactions_not_fully_synced",
            Self::NotFound { .. } | Self::UserNotFound(_) => "not_found",
            Self::InvalidRecord(_) => "invalid_record",
            Self::Store(_) => "store_error",
        }
    }

    /// Returns the taxonomy category of this error.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConfigurationMissing(_) => ErrorCategory::ConfigurationMissing,
            Self::ResolutionFailed { .. } => ErrorCategory::ResolutionFailed,
            Self::ExternalApi { .. } => ErrorCategory::ExternalApiError,
            Self::TransactionsNotFullySynced { .. } => ErrorCategory::DependencyNotReady,
            Self::NotFound { .. } | Self::UserNotFound(_) => ErrorCategory::NotFound,
            Self::InvalidRecord(_) => ErrorCategory::InvalidRecord,
            Self::Store(_) => ErrorCategory::StoreError,
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn http_status_code(&self) -> u16 {
        match self {
            // 404 Not Found
            Self::NotFound { .. } | Self::UserNotFound(_) => 404,

            // 409 Conflict - waiting on other records
            Self::TransactionsNotFullySynced { .. } => 409,

            // 422 Unprocessable - mapping or data problems
            Self::ConfigurationMissing(_)
            | Self::ResolutionFailed { .. }
            | Self::InvalidRecord(_) => 422,

            // 502 Bad Gateway - the accounting API failed
            Self::ExternalApi { .. } => 502,

            // 500 Internal Server Error
            Self::Store(_) => 500,
        }
    }

    /// Returns true if re-invoking the entry point later may succeed
    /// without operator action.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ExternalApi { .. } | Self::TransactionsNotFullySynced { .. } | Self::Store(_)
        )
    }

    /// Returns true if this failure belongs on the record itself.
    ///
    /// A missing record has no row to write and a store failure could
    /// not be written anyway.
    #[must_use]
    pub fn is_persisted(&self) -> bool {
        !matches!(self, Self::NotFound { .. } | Self::Store(_))
    }

    /// Structured failure payload stored in `sync_error`.
    #[must_use]
    pub fn failure_detail(&self) -> Value {
        let mut detail = json!({
            "code": self.error_code(),
            "category": self.category().as_str(),
            "message": self.to_string(),
            "retryable": self.is_retryable(),
        });

        match self {
            Self::ExternalApi {
                status,
                detail: raw,
                ..
            } => {
                detail["status"] = json!(status);
                if let Some(raw) = raw {
                    detail["response"] = raw.clone();
                }
            }
            Self::ResolutionFailed { kind, name } => {
                detail["lookup"] = json!({ "kind": kind.as_str(), "name": name });
            }
            Self::TransactionsNotFullySynced { unsynced, .. } => {
                detail["unsynced"] = json!(unsynced);
            }
            _ => {}
        }

        detail
    }
}

impl From<ClientError> for SyncError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Rejected {
                status,
                message,
                detail,
            } => Self::ExternalApi {
                status: Some(status),
                message,
                detail,
            },
            ClientError::Timeout => Self::ExternalApi {
                status: None,
                message: "request timed out".to_string(),
                detail: None,
            },
            ClientError::Transport(message) | ClientError::Decode(message) => Self::ExternalApi {
                status: None,
                message,
                detail: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            SyncError::ConfigurationMissing("item".into()).error_code(),
            "configuration_missing"
        );
        assert_eq!(
            SyncError::ResolutionFailed {
                kind: LookupKind::Class,
                name: "Events".into(),
            }
            .error_code(),
            "resolution_failed"
        );
        assert_eq!(
            SyncError::TransactionsNotFullySynced {
                payout_id: PayoutId::new(),
                unsynced: 2,
            }
            .error_code(),
            "transactions_not_fully_synced"
        );
        assert_eq!(
            SyncError::UserNotFound(UserId::new()).error_code(),
            "not_found"
        );
    }

    #[test]
    fn test_dependency_category() {
        let err = SyncError::TransactionsNotFullySynced {
            payout_id: PayoutId::new(),
            unsynced: 1,
        };
        assert_eq!(err.category(), ErrorCategory::DependencyNotReady);
        assert_eq!(err.category().as_str(), "dependency_not_ready");
        assert_eq!(err.http_status_code(), 409);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_http_status_codes() {
        assert_eq!(
            SyncError::NotFound {
                kind: RecordKind::Payment,
                id: Uuid::nil(),
            }
            .http_status_code(),
            404
        );
        assert_eq!(
            SyncError::ConfigurationMissing(String::new()).http_status_code(),
            422
        );
        assert_eq!(
            SyncError::ExternalApi {
                status: Some(400),
                message: String::new(),
                detail: None,
            }
            .http_status_code(),
            502
        );
        assert_eq!(SyncError::Store(String::new()).http_status_code(), 500);
    }

    #[test]
    fn test_persistence_policy() {
        assert!(SyncError::ConfigurationMissing(String::new()).is_persisted());
        assert!(!SyncError::Store(String::new()).is_persisted());
        assert!(
            !SyncError::NotFound {
                kind: RecordKind::Refund,
                id: Uuid::nil(),
            }
            .is_persisted()
        );
    }

    #[test]
    fn test_failure_detail_for_external_error() {
        let err = SyncError::ExternalApi {
            status: Some(400),
            message: "Business Validation Error".into(),
            detail: Some(json!({"Fault": {"type": "ValidationFault"}})),
        };
        let detail = err.failure_detail();
        assert_eq!(detail["code"], "external_api_error");
        assert_eq!(detail["status"], 400);
        assert_eq!(detail["response"]["Fault"]["type"], "ValidationFault");
        assert_eq!(detail["retryable"], true);
    }

    #[test]
    fn test_client_error_conversion() {
        let err: SyncError = ClientError::Timeout.into();
        assert!(matches!(err, SyncError::ExternalApi { status: None, .. }));
        assert_eq!(err.to_string(), "Accounting API error: request timed out");
    }

    #[test]
    fn test_error_display() {
        let err = SyncError::NotFound {
            kind: RecordKind::Payout,
            id: Uuid::nil(),
        };
        assert_eq!(
            err.to_string(),
            "payout not found: 00000000-0000-0000-0000-000000000000"
        );

        let err = SyncError::ResolutionFailed {
            kind: LookupKind::Account,
            name: "Undeposited Funds".into(),
        };
        assert_eq!(
            err.to_string(),
            "Could not resolve account 'Undeposited Funds' in the accounting system"
        );
    }
}
