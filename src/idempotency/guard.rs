//! Idempotency Guard
//!
//! Answers one question before any side effect runs: has this message id
//! been processed already? A `Fresh` reservation is logical; it becomes
//! durable only when the caller finalizes it inside the same store
//! transaction as the mutation it guards. A crash between check and
//! commit therefore leaves nothing behind, and the redelivered message
//! simply reserves again.

use std::sync::Arc;

use uuid::Uuid;

use crate::domain::{ProcessedMessage, TransferOutcome};
use crate::store::{LedgerStore, StoreError};

/// Result of checking a message id against the processed-message table
#[derive(Debug)]
pub enum Reservation {
    /// First time we see this id; finalize the token with the outcome
    /// in the same transaction as the balance mutation.
    Fresh(ReservationToken),

    /// Already processed: the stored outcome, for re-emission.
    AlreadyProcessed(TransferOutcome),
}

/// A pending reservation for a fresh message id.
/// Converted into the `ProcessedMessage` record at commit time.
#[derive(Debug, Clone)]
pub struct ReservationToken {
    message_id: Uuid,
    fingerprint: String,
}

impl ReservationToken {
    pub fn message_id(&self) -> Uuid {
        self.message_id
    }

    /// Finalize the reservation into the record the store commits
    /// alongside the guarded mutation.
    pub fn finalize(self, outcome: TransferOutcome) -> ProcessedMessage {
        ProcessedMessage::new(self.message_id, self.fingerprint, outcome)
    }
}

/// Guard errors
#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    /// Message id reused with a different payload; permanent rejection
    #[error("Message {0} redelivered with a different payload")]
    FingerprintMismatch(Uuid),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// Deduplicates inbound messages against the ledger store's
/// processed-message records.
#[derive(Clone)]
pub struct IdempotencyGuard {
    store: Arc<dyn LedgerStore>,
}

impl IdempotencyGuard {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Check a message id and either reserve it or return the stored
    /// outcome.
    ///
    /// # Errors
    /// - `GuardError::FingerprintMismatch` when the id was processed with
    ///   a different payload
    /// - `GuardError::Storage` when the store is unreachable; the caller
    ///   retries with backoff
    pub async fn check_and_reserve(
        &self,
        message_id: Uuid,
        fingerprint: &str,
    ) -> Result<Reservation, GuardError> {
        match self.store.fetch_processed(message_id).await? {
            Some(record) => {
                if record.fingerprint != fingerprint {
                    return Err(GuardError::FingerprintMismatch(message_id));
                }
                Ok(Reservation::AlreadyProcessed(record.outcome))
            }
            None => Ok(Reservation::Fresh(ReservationToken {
                message_id,
                fingerprint: fingerprint.to_string(),
            })),
        }
    }
}
