//! Error handling module
//!
//! Centralized error taxonomy and HTTP response conversion.
//! Every failure in the processing path maps onto one of these variants;
//! the transient/permanent split drives the coordinator's retry decisions.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use crate::bus::BusError;
use crate::domain::{CommandError, FailureReason};
use crate::store::StoreError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, CoordinatorError>;

/// Processing errors, classified per the retry policy:
/// permanent errors become `TransferFailed` events and are never retried;
/// transient errors are retried locally up to a configured bound;
/// `DeadlineExceeded` dead-letters the command.
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    // Permanent: caller error
    #[error("Invalid command: {0}")]
    InvalidCommand(#[from] CommandError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Message {0} redelivered with a different payload")]
    FingerprintMismatch(Uuid),

    // Permanent: business rejection
    #[error("Insufficient funds in account {account_id}: required {required}, available {available}")]
    InsufficientFunds {
        account_id: Uuid,
        required: i64,
        available: i64,
    },

    #[error("Account not found: {0}")]
    AccountNotFound(Uuid),

    // Transient: bounded retry
    #[error("Concurrent modification of account {account_id}: expected revision {expected}, found {actual}")]
    ConcurrentModification {
        account_id: Uuid,
        expected: i64,
        actual: i64,
    },

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Bus unavailable: {0}")]
    BusUnavailable(String),

    // Fatal for this attempt: dead-lettered
    #[error("Command exceeded its processing deadline")]
    DeadlineExceeded,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoordinatorError {
    /// Transient errors are worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ConcurrentModification { .. }
                | Self::StorageUnavailable(_)
                | Self::BusUnavailable(_)
        )
    }

    /// Permanent errors convert into a `TransferFailed` event and are
    /// surfaced to the originator, never retried.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::InvalidCommand(_)
                | Self::InvalidRequest(_)
                | Self::FingerprintMismatch(_)
                | Self::InsufficientFunds { .. }
                | Self::AccountNotFound(_)
        )
    }

    /// The failure reason recorded in the outcome and carried by
    /// `TransferFailed`.
    pub fn failure_reason(&self) -> FailureReason {
        match self {
            Self::InvalidCommand(_) | Self::InvalidRequest(_) | Self::FingerprintMismatch(_) => {
                FailureReason::InvalidCommand
            }
            Self::InsufficientFunds { .. } => FailureReason::InsufficientFunds,
            Self::AccountNotFound(_) => FailureReason::AccountNotFound,
            Self::ConcurrentModification { .. } => FailureReason::ConcurrencyConflict,
            Self::DeadlineExceeded => FailureReason::DeadlineExceeded,
            Self::StorageUnavailable(_) | Self::BusUnavailable(_) | Self::Internal(_) => {
                FailureReason::InternalError
            }
        }
    }
}

impl From<StoreError> for CoordinatorError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::RevisionConflict {
                account_id,
                expected,
                actual,
            } => Self::ConcurrentModification {
                account_id,
                expected,
                actual,
            },
            StoreError::AccountNotFound(id) => Self::AccountNotFound(id),
            // A duplicate record means another worker finished first; the
            // caller re-reads the stored outcome, so surface as a conflict.
            StoreError::DuplicateMessage(id) => Self::ConcurrentModification {
                account_id: id,
                expected: 0,
                actual: 0,
            },
            StoreError::Unavailable(msg) => Self::StorageUnavailable(msg),
            StoreError::Serialization(e) => Self::Internal(e.to_string()),
            StoreError::InvalidRecord(msg) => Self::Internal(msg),
        }
    }
}

impl From<BusError> for CoordinatorError {
    fn from(err: BusError) -> Self {
        match err {
            BusError::Closed => Self::BusUnavailable("bus closed".to_string()),
            BusError::Unavailable(msg) => Self::BusUnavailable(msg),
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IntoResponse for CoordinatorError {
    fn into_response(self) -> Response {
        let (status, error_code, details) = match &self {
            // 400 Bad Request
            CoordinatorError::InvalidCommand(e) => {
                (StatusCode::BAD_REQUEST, "invalid_command", Some(e.to_string()))
            }
            CoordinatorError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", Some(msg.clone()))
            }
            CoordinatorError::InsufficientFunds { .. } => {
                (StatusCode::BAD_REQUEST, "insufficient_funds", None)
            }

            // 404 Not Found
            CoordinatorError::AccountNotFound(id) => {
                (StatusCode::NOT_FOUND, "account_not_found", Some(id.to_string()))
            }

            // 409 Conflict
            CoordinatorError::FingerprintMismatch(id) => {
                (StatusCode::CONFLICT, "fingerprint_mismatch", Some(id.to_string()))
            }
            CoordinatorError::ConcurrentModification { .. } => {
                (StatusCode::CONFLICT, "concurrent_modification", None)
            }

            // 503 Service Unavailable
            CoordinatorError::StorageUnavailable(msg) => {
                tracing::error!("Storage unavailable: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, "storage_unavailable", None)
            }
            CoordinatorError::BusUnavailable(msg) => {
                tracing::error!("Bus unavailable: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, "bus_unavailable", None)
            }

            // 504 / 500
            CoordinatorError::DeadlineExceeded => {
                (StatusCode::GATEWAY_TIMEOUT, "deadline_exceeded", None)
            }
            CoordinatorError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: self.to_string(),
            error_code: error_code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}
