//! Common test utilities
//!
//! In-memory harness: ledger store, bus and coordinator wired the same
//! way the composition root wires the production backends.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use bank_mesh::bus::InMemoryBus;
use bank_mesh::coordinator::{RetryPolicy, TransferCoordinator};
use bank_mesh::domain::{Balance, ProcessedMessage};
use bank_mesh::store::{
    AccountRecord, LedgerStore, MemoryLedgerStore, StoreError, TransferApplication,
};

pub struct Harness {
    pub store: Arc<MemoryLedgerStore>,
    pub bus: Arc<InMemoryBus>,
    pub coordinator: Arc<TransferCoordinator>,
}

pub fn harness() -> Harness {
    harness_with_policy(fast_policy())
}

pub fn harness_with_policy(policy: RetryPolicy) -> Harness {
    let store = Arc::new(MemoryLedgerStore::new());
    let bus = Arc::new(InMemoryBus::new());
    let coordinator = Arc::new(TransferCoordinator::new(store.clone(), bus.clone(), policy));
    Harness {
        store,
        bus,
        coordinator,
    }
}

/// Default policy with short backoffs so retry paths stay fast under test
pub fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        backoff_base: Duration::from_millis(2),
        ..RetryPolicy::default()
    }
}

impl Harness {
    pub async fn seed_account(&self, balance: i64) -> Uuid {
        let id = Uuid::new_v4();
        self.store
            .insert_account(AccountRecord::new(id, Balance::new(balance).unwrap()))
            .await
            .unwrap();
        id
    }

    pub async fn balance_of(&self, account_id: Uuid) -> i64 {
        self.store
            .fetch_account(account_id)
            .await
            .unwrap()
            .unwrap()
            .balance
            .minor_units()
    }

    pub async fn revision_of(&self, account_id: Uuid) -> i64 {
        self.store
            .fetch_account(account_id)
            .await
            .unwrap()
            .unwrap()
            .revision
    }
}

/// Poll until `condition` holds or the timeout elapses.
pub async fn wait_until<F>(timeout: Duration, mut condition: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            panic!("Condition not reached within {:?}", timeout);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Store whose every call fails, for outage handling tests
pub struct UnavailableStore;

#[async_trait]
impl LedgerStore for UnavailableStore {
    async fn fetch_account(&self, _: Uuid) -> Result<Option<AccountRecord>, StoreError> {
        Err(StoreError::Unavailable("injected outage".to_string()))
    }

    async fn fetch_processed(&self, _: Uuid) -> Result<Option<ProcessedMessage>, StoreError> {
        Err(StoreError::Unavailable("injected outage".to_string()))
    }

    async fn commit_transfer(&self, _: TransferApplication) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("injected outage".to_string()))
    }

    async fn record_outcome(&self, _: ProcessedMessage) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("injected outage".to_string()))
    }

    async fn insert_account(&self, _: AccountRecord) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("injected outage".to_string()))
    }
}

/// Store that never answers, for deadline tests
pub struct StalledStore;

#[async_trait]
impl LedgerStore for StalledStore {
    async fn fetch_account(&self, _: Uuid) -> Result<Option<AccountRecord>, StoreError> {
        tokio::time::sleep(Duration::from_secs(600)).await;
        Err(StoreError::Unavailable("stalled".to_string()))
    }

    async fn fetch_processed(&self, _: Uuid) -> Result<Option<ProcessedMessage>, StoreError> {
        tokio::time::sleep(Duration::from_secs(600)).await;
        Err(StoreError::Unavailable("stalled".to_string()))
    }

    async fn commit_transfer(&self, _: TransferApplication) -> Result<(), StoreError> {
        tokio::time::sleep(Duration::from_secs(600)).await;
        Err(StoreError::Unavailable("stalled".to_string()))
    }

    async fn record_outcome(&self, _: ProcessedMessage) -> Result<(), StoreError> {
        tokio::time::sleep(Duration::from_secs(600)).await;
        Err(StoreError::Unavailable("stalled".to_string()))
    }

    async fn insert_account(&self, _: AccountRecord) -> Result<(), StoreError> {
        tokio::time::sleep(Duration::from_secs(600)).await;
        Err(StoreError::Unavailable("stalled".to_string()))
    }
}
