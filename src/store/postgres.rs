//! PostgreSQL Ledger Store
//!
//! Relational backend: `accounts(id, balance, revision)` and
//! `processed_messages(message_id, fingerprint, outcome, processed_at)`.
//! Writes are revision-guarded UPDATEs; a transfer commits both rows and
//! the processed-message record in a single transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::{Balance, ProcessedMessage, TransferOutcome};

use super::{AccountRecord, AccountWrite, LedgerStore, StoreError, TransferApplication};

/// Ledger store backed by PostgreSQL
#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    /// Create a new PgLedgerStore with a database pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply one revision-guarded account write inside the transaction.
    async fn apply_write(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        write: &AccountWrite,
    ) -> Result<(), StoreError> {
        let rows = sqlx::query(
            r#"
            UPDATE accounts
            SET balance = $2, revision = revision + 1
            WHERE id = $1 AND revision = $3
            "#,
        )
        .bind(write.account_id)
        .bind(write.new_balance.minor_units())
        .bind(write.expected_revision)
        .execute(&mut **tx)
        .await?
        .rows_affected();

        if rows == 0 {
            // Distinguish a missing row from a moved revision
            let actual: Option<i64> =
                sqlx::query_scalar("SELECT revision FROM accounts WHERE id = $1")
                    .bind(write.account_id)
                    .fetch_optional(&mut **tx)
                    .await?;

            return Err(match actual {
                Some(actual) => StoreError::RevisionConflict {
                    account_id: write.account_id,
                    expected: write.expected_revision,
                    actual,
                },
                None => StoreError::AccountNotFound(write.account_id),
            });
        }

        Ok(())
    }

    /// Insert the processed-message record inside the transaction.
    /// The primary-key conflict path is how a racing worker loses.
    async fn insert_record(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        record: &ProcessedMessage,
    ) -> Result<(), StoreError> {
        let outcome = serde_json::to_value(&record.outcome)?;

        let rows = sqlx::query(
            r#"
            INSERT INTO processed_messages (message_id, fingerprint, outcome, processed_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (message_id) DO NOTHING
            "#,
        )
        .bind(record.message_id)
        .bind(&record.fingerprint)
        .bind(&outcome)
        .bind(record.processed_at)
        .execute(&mut **tx)
        .await?
        .rows_affected();

        if rows == 0 {
            return Err(StoreError::DuplicateMessage(record.message_id));
        }

        Ok(())
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn fetch_account(&self, account_id: Uuid) -> Result<Option<AccountRecord>, StoreError> {
        let row: Option<(Uuid, i64, i64)> = sqlx::query_as(
            r#"
            SELECT id, balance, revision FROM accounts WHERE id = $1
            "#,
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(id, balance, revision)| {
            let balance = Balance::new(balance).map_err(|e| {
                StoreError::InvalidRecord(format!("account {} balance: {}", id, e))
            })?;
            Ok(AccountRecord {
                id,
                balance,
                revision,
            })
        })
        .transpose()
    }

    async fn fetch_processed(
        &self,
        message_id: Uuid,
    ) -> Result<Option<ProcessedMessage>, StoreError> {
        let row: Option<(Uuid, String, serde_json::Value, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT message_id, fingerprint, outcome, processed_at
            FROM processed_messages
            WHERE message_id = $1
            "#,
        )
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(message_id, fingerprint, outcome, processed_at)| {
            let outcome: TransferOutcome = serde_json::from_value(outcome)?;
            Ok(ProcessedMessage {
                message_id,
                fingerprint,
                outcome,
                processed_at,
            })
        })
        .transpose()
    }

    async fn commit_transfer(&self, application: TransferApplication) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        self.apply_write(&mut tx, &application.debit).await?;
        self.apply_write(&mut tx, &application.credit).await?;
        self.insert_record(&mut tx, &application.record).await?;

        tx.commit().await?;

        Ok(())
    }

    async fn record_outcome(&self, record: ProcessedMessage) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        self.insert_record(&mut tx, &record).await?;
        tx.commit().await?;

        Ok(())
    }

    async fn insert_account(&self, account: AccountRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO accounts (id, balance, revision)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(account.id)
        .bind(account.balance.minor_units())
        .bind(account.revision)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
