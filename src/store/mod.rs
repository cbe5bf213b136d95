//! Ledger Store module
//!
//! Exclusive owner of account state and processed-message records.
//! The coordinator reads and writes balances only through this interface;
//! the processed-message record and the balance mutation it guards commit
//! in one transaction, which is what turns at-least-once delivery into
//! exactly-once effect.

mod error;
mod memory;
mod postgres;

pub use error::StoreError;
pub use memory::MemoryLedgerStore;
pub use postgres::PgLedgerStore;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{Balance, ProcessedMessage};

/// An account row: balance plus optimistic-concurrency revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRecord {
    pub id: Uuid,
    pub balance: Balance,
    pub revision: i64,
}

impl AccountRecord {
    pub fn new(id: Uuid, balance: Balance) -> Self {
        Self {
            id,
            balance,
            revision: 1,
        }
    }
}

/// A revision-guarded write to one account.
/// The store rejects the whole transaction if the row's revision no longer
/// matches `expected_revision`.
#[derive(Debug, Clone)]
pub struct AccountWrite {
    pub account_id: Uuid,
    pub expected_revision: i64,
    pub new_balance: Balance,
}

/// Everything one committed transfer writes: both account rows and the
/// processed-message record, atomically.
#[derive(Debug, Clone)]
pub struct TransferApplication {
    pub record: ProcessedMessage,
    pub debit: AccountWrite,
    pub credit: AccountWrite,
}

/// Durable store of account balances and processed-message identifiers.
///
/// All mutations are atomic and isolated per account pair; cross-account
/// transfers update both rows in one transaction so a half-applied
/// transfer is never observable.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Read an account row, including its current revision.
    async fn fetch_account(&self, account_id: Uuid) -> Result<Option<AccountRecord>, StoreError>;

    /// Look up the recorded outcome for a message id, if any.
    async fn fetch_processed(&self, message_id: Uuid)
        -> Result<Option<ProcessedMessage>, StoreError>;

    /// Atomically apply a transfer: both revision-guarded account writes
    /// plus the processed-message record, in one transaction.
    ///
    /// # Errors
    /// - `StoreError::RevisionConflict` if either row moved underneath us
    /// - `StoreError::AccountNotFound` if either row is missing
    /// - `StoreError::DuplicateMessage` if the message id is already recorded
    async fn commit_transfer(&self, application: TransferApplication) -> Result<(), StoreError>;

    /// Record a failure outcome with no balance mutation.
    /// Same dedup table and uniqueness rules as `commit_transfer`.
    async fn record_outcome(&self, record: ProcessedMessage) -> Result<(), StoreError>;

    /// Create an account row (seeding / administration).
    /// Inserting an id that already exists is a no-op.
    async fn insert_account(&self, account: AccountRecord) -> Result<(), StoreError>;
}
