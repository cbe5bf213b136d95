//! Ledger Store Errors

use uuid::Uuid;

/// Errors that can occur in the ledger store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Optimistic concurrency conflict
    #[error("Revision conflict for account {account_id}: expected {expected}, found {actual}")]
    RevisionConflict {
        account_id: Uuid,
        expected: i64,
        actual: i64,
    },

    /// Account row missing
    #[error("Account not found: {0}")]
    AccountNotFound(Uuid),

    /// Message id already has a recorded outcome
    #[error("Message already processed: {0}")]
    DuplicateMessage(Uuid),

    /// Backend unreachable or failing
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// Outcome payload could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored row violates a domain invariant
    #[error("Invalid stored record: {0}")]
    InvalidRecord(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

impl StoreError {
    /// Check if this error is a revision conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::RevisionConflict { .. })
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::RevisionConflict { .. } | StoreError::Unavailable(_)
        )
    }
}
