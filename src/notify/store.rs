//! Notification Store
//!
//! Persistence for notification records: one row per handled
//! `NotificationRequested` event, written once the delivery reaches a
//! terminal state. The row's existence doubles as the dispatcher's dedup
//! check.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::store::StoreError;

/// Terminal delivery status of a notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeliveryStatus {
    Delivered,
    Failed { reason: String },
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryStatus::Delivered => write!(f, "delivered"),
            DeliveryStatus::Failed { reason } => write!(f, "failed: {}", reason),
        }
    }
}

/// A handled notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    /// The originating event id; the dedup key
    pub id: Uuid,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub status: DeliveryStatus,
    pub created_at: DateTime<Utc>,
}

/// Store surface for notification records
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Persist a record. Inserting an id that already exists is a no-op.
    async fn insert(&self, record: NotificationRecord) -> Result<(), StoreError>;

    /// Look up a record by event id.
    async fn fetch(&self, id: Uuid) -> Result<Option<NotificationRecord>, StoreError>;

    /// All records, newest first.
    async fn list(&self) -> Result<Vec<NotificationRecord>, StoreError>;
}

/// Notification store backed by PostgreSQL
#[derive(Debug, Clone)]
pub struct PgNotificationStore {
    pool: PgPool,
}

impl PgNotificationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

type NotificationRow = (Uuid, String, String, String, serde_json::Value, DateTime<Utc>);

fn from_row(row: NotificationRow) -> Result<NotificationRecord, StoreError> {
    let (id, recipient, subject, body, status, created_at) = row;
    let status: DeliveryStatus = serde_json::from_value(status)?;
    Ok(NotificationRecord {
        id,
        recipient,
        subject,
        body,
        status,
        created_at,
    })
}

#[async_trait]
impl NotificationStore for PgNotificationStore {
    async fn insert(&self, record: NotificationRecord) -> Result<(), StoreError> {
        let status = serde_json::to_value(&record.status)?;

        sqlx::query(
            r#"
            INSERT INTO notifications (id, recipient, subject, body, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(record.id)
        .bind(&record.recipient)
        .bind(&record.subject)
        .bind(&record.body)
        .bind(&status)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<NotificationRecord>, StoreError> {
        let row: Option<NotificationRow> = sqlx::query_as(
            r#"
            SELECT id, recipient, subject, body, status, created_at
            FROM notifications
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(from_row).transpose()
    }

    async fn list(&self) -> Result<Vec<NotificationRecord>, StoreError> {
        let rows: Vec<NotificationRow> = sqlx::query_as(
            r#"
            SELECT id, recipient, subject, body, status, created_at
            FROM notifications
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(from_row).collect()
    }
}

/// Notification store held in process memory, for tests and demo wiring
#[derive(Debug, Default)]
pub struct MemoryNotificationStore {
    records: Mutex<HashMap<Uuid, NotificationRecord>>,
}

impl MemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationStore for MemoryNotificationStore {
    async fn insert(&self, record: NotificationRecord) -> Result<(), StoreError> {
        let mut records = self.records.lock().expect("notification lock poisoned");
        records.entry(record.id).or_insert(record);
        Ok(())
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<NotificationRecord>, StoreError> {
        let records = self.records.lock().expect("notification lock poisoned");
        Ok(records.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<NotificationRecord>, StoreError> {
        let records = self.records.lock().expect("notification lock poisoned");
        let mut all: Vec<_> = records.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }
}
