//! In-memory Ledger Store
//!
//! Process-local backend with the same atomicity and revision semantics as
//! the PostgreSQL store. Used by the test suite and the self-contained
//! demo wiring; a single lock around the whole state stands in for the
//! database transaction.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{Balance, ProcessedMessage};

use super::{AccountRecord, AccountWrite, LedgerStore, StoreError, TransferApplication};

#[derive(Debug, Default)]
struct MemoryState {
    accounts: HashMap<Uuid, (Balance, i64)>,
    processed: HashMap<Uuid, ProcessedMessage>,
}

impl MemoryState {
    /// Validate one write against the current state without applying it.
    fn check_write(&self, write: &AccountWrite) -> Result<(), StoreError> {
        match self.accounts.get(&write.account_id) {
            None => Err(StoreError::AccountNotFound(write.account_id)),
            Some((_, revision)) if *revision != write.expected_revision => {
                Err(StoreError::RevisionConflict {
                    account_id: write.account_id,
                    expected: write.expected_revision,
                    actual: *revision,
                })
            }
            Some(_) => Ok(()),
        }
    }

    fn apply_write(&mut self, write: &AccountWrite) {
        if let Some(entry) = self.accounts.get_mut(&write.account_id) {
            *entry = (write.new_balance, write.expected_revision + 1);
        }
    }
}

/// Ledger store held entirely in process memory
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    state: Mutex<MemoryState>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sum of all balances, for conservation checks in tests.
    pub fn total_balance(&self) -> i64 {
        let state = self.state.lock().expect("ledger lock poisoned");
        state
            .accounts
            .values()
            .map(|(balance, _)| balance.minor_units())
            .sum()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn fetch_account(&self, account_id: Uuid) -> Result<Option<AccountRecord>, StoreError> {
        let state = self.state.lock().expect("ledger lock poisoned");
        Ok(state
            .accounts
            .get(&account_id)
            .map(|(balance, revision)| AccountRecord {
                id: account_id,
                balance: *balance,
                revision: *revision,
            }))
    }

    async fn fetch_processed(
        &self,
        message_id: Uuid,
    ) -> Result<Option<ProcessedMessage>, StoreError> {
        let state = self.state.lock().expect("ledger lock poisoned");
        Ok(state.processed.get(&message_id).cloned())
    }

    async fn commit_transfer(&self, application: TransferApplication) -> Result<(), StoreError> {
        let mut state = self.state.lock().expect("ledger lock poisoned");

        if state.processed.contains_key(&application.record.message_id) {
            return Err(StoreError::DuplicateMessage(application.record.message_id));
        }

        // Validate everything before mutating anything: all-or-nothing,
        // like the database transaction it mirrors.
        state.check_write(&application.debit)?;
        state.check_write(&application.credit)?;

        state.apply_write(&application.debit);
        state.apply_write(&application.credit);
        state
            .processed
            .insert(application.record.message_id, application.record);

        Ok(())
    }

    async fn record_outcome(&self, record: ProcessedMessage) -> Result<(), StoreError> {
        let mut state = self.state.lock().expect("ledger lock poisoned");

        if state.processed.contains_key(&record.message_id) {
            return Err(StoreError::DuplicateMessage(record.message_id));
        }

        state.processed.insert(record.message_id, record);
        Ok(())
    }

    async fn insert_account(&self, account: AccountRecord) -> Result<(), StoreError> {
        let mut state = self.state.lock().expect("ledger lock poisoned");
        state
            .accounts
            .entry(account.id)
            .or_insert((account.balance, account.revision));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FailureReason, TransferOutcome};

    fn seeded_store(source: Uuid, dest: Uuid) -> MemoryLedgerStore {
        let store = MemoryLedgerStore::new();
        {
            let mut state = store.state.lock().unwrap();
            state
                .accounts
                .insert(source, (Balance::new(1000).unwrap(), 1));
            state.accounts.insert(dest, (Balance::zero(), 1));
        }
        store
    }

    fn application(source: Uuid, dest: Uuid, message_id: Uuid) -> TransferApplication {
        TransferApplication {
            record: ProcessedMessage::new(
                message_id,
                "fp".to_string(),
                TransferOutcome::Applied {
                    source_account_id: source,
                    destination_account_id: dest,
                    amount_minor_units: 500,
                    correlation_id: Uuid::new_v4(),
                },
            ),
            debit: AccountWrite {
                account_id: source,
                expected_revision: 1,
                new_balance: Balance::new(500).unwrap(),
            },
            credit: AccountWrite {
                account_id: dest,
                expected_revision: 1,
                new_balance: Balance::new(500).unwrap(),
            },
        }
    }

    #[tokio::test]
    async fn test_commit_transfer_applies_both_writes() {
        let source = Uuid::new_v4();
        let dest = Uuid::new_v4();
        let store = seeded_store(source, dest);

        store
            .commit_transfer(application(source, dest, Uuid::new_v4()))
            .await
            .unwrap();

        let source_row = store.fetch_account(source).await.unwrap().unwrap();
        let dest_row = store.fetch_account(dest).await.unwrap().unwrap();
        assert_eq!(source_row.balance.minor_units(), 500);
        assert_eq!(source_row.revision, 2);
        assert_eq!(dest_row.balance.minor_units(), 500);
        assert_eq!(dest_row.revision, 2);
        assert_eq!(store.total_balance(), 1000);
    }

    #[tokio::test]
    async fn test_commit_transfer_rejects_stale_revision() {
        let source = Uuid::new_v4();
        let dest = Uuid::new_v4();
        let store = seeded_store(source, dest);

        let mut app = application(source, dest, Uuid::new_v4());
        app.credit.expected_revision = 7;

        let err = store.commit_transfer(app).await.unwrap_err();
        assert!(err.is_conflict());

        // Nothing was applied: the debit side is untouched too
        let source_row = store.fetch_account(source).await.unwrap().unwrap();
        assert_eq!(source_row.balance.minor_units(), 1000);
        assert_eq!(source_row.revision, 1);
    }

    #[tokio::test]
    async fn test_commit_transfer_rejects_duplicate_message() {
        let source = Uuid::new_v4();
        let dest = Uuid::new_v4();
        let store = seeded_store(source, dest);
        let message_id = Uuid::new_v4();

        store
            .commit_transfer(application(source, dest, message_id))
            .await
            .unwrap();

        let mut second = application(source, dest, message_id);
        second.debit.expected_revision = 2;
        second.credit.expected_revision = 2;

        let err = store.commit_transfer(second).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateMessage(id) if id == message_id));
        assert_eq!(store.total_balance(), 1000);
    }

    #[tokio::test]
    async fn test_record_outcome_dedups() {
        let store = MemoryLedgerStore::new();
        let message_id = Uuid::new_v4();
        let record = ProcessedMessage::new(
            message_id,
            "fp".to_string(),
            TransferOutcome::Rejected {
                source_account_id: Uuid::new_v4(),
                amount_minor_units: 2000,
                correlation_id: Uuid::new_v4(),
                reason: FailureReason::InsufficientFunds,
            },
        );

        store.record_outcome(record.clone()).await.unwrap();
        let err = store.record_outcome(record).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateMessage(_)));

        let stored = store.fetch_processed(message_id).await.unwrap().unwrap();
        assert!(!stored.outcome.is_applied());
    }

    #[tokio::test]
    async fn test_insert_account_is_idempotent() {
        let store = MemoryLedgerStore::new();
        let id = Uuid::new_v4();

        store
            .insert_account(AccountRecord::new(id, Balance::new(100).unwrap()))
            .await
            .unwrap();
        store
            .insert_account(AccountRecord::new(id, Balance::new(999).unwrap()))
            .await
            .unwrap();

        let row = store.fetch_account(id).await.unwrap().unwrap();
        assert_eq!(row.balance.minor_units(), 100);
    }
}
