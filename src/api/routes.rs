//! API Routes
//!
//! Thin HTTP surface in front of the bus: transfer submissions are
//! enveloped and enqueued, never processed inline. Reads go straight to
//! the stores.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bus::MessageBus;
use crate::domain::{Balance, CommandEnvelope};
use crate::error::CoordinatorError;
use crate::notify::NotificationStore;
use crate::store::{AccountRecord, LedgerStore};

/// Shared handles for the HTTP layer.
/// Built once in the composition root; no ambient registry.
#[derive(Clone)]
pub struct AppState {
    pub bus: Arc<dyn MessageBus>,
    pub store: Arc<dyn LedgerStore>,
    pub notifications: Arc<dyn NotificationStore>,
}

// =========================================================================
// Request/Response types
// =========================================================================

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub source_account_id: Uuid,
    pub destination_account_id: Uuid,
    pub amount_minor_units: i64,
    #[serde(default)]
    pub correlation_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct TransferAccepted {
    pub message_id: Uuid,
    pub correlation_id: Uuid,
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    #[serde(default)]
    pub account_id: Option<Uuid>,
    #[serde(default)]
    pub opening_balance_minor_units: i64,
}

#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub id: Uuid,
    pub balance_minor_units: i64,
    pub revision: i64,
}

#[derive(Debug, Serialize)]
pub struct NotificationResponse {
    pub id: Uuid,
    pub recipient: String,
    pub subject: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

// =========================================================================
// Handlers
// =========================================================================

/// POST /api/v1/transfers
///
/// Accepts a transfer for asynchronous processing. The response carries
/// the message id; completion is observable through balances and events.
async fn submit_transfer(
    State(state): State<AppState>,
    Json(request): Json<TransferRequest>,
) -> Result<(StatusCode, Json<TransferAccepted>), CoordinatorError> {
    let mut envelope = CommandEnvelope::new(
        request.source_account_id,
        request.destination_account_id,
        request.amount_minor_units,
    );
    if let Some(correlation_id) = request.correlation_id {
        envelope = envelope.with_correlation_id(correlation_id);
    }

    // Reject obviously malformed requests at the edge; the coordinator
    // re-validates whatever reaches it over the bus.
    envelope.validate()?;

    let accepted = TransferAccepted {
        message_id: envelope.message_id,
        correlation_id: envelope.correlation_id,
        status: "accepted".to_string(),
    };

    state.bus.send_command(envelope).await?;

    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

/// POST /api/v1/accounts
async fn create_account(
    State(state): State<AppState>,
    Json(request): Json<CreateAccountRequest>,
) -> Result<(StatusCode, Json<AccountResponse>), CoordinatorError> {
    let balance = Balance::new(request.opening_balance_minor_units)
        .map_err(|e| CoordinatorError::InvalidRequest(format!("opening balance: {}", e)))?;

    let record = AccountRecord::new(request.account_id.unwrap_or_else(Uuid::new_v4), balance);
    state.store.insert_account(record.clone()).await?;

    Ok((
        StatusCode::CREATED,
        Json(AccountResponse {
            id: record.id,
            balance_minor_units: record.balance.minor_units(),
            revision: record.revision,
        }),
    ))
}

/// GET /api/v1/accounts/:id
async fn get_account(
    State(state): State<AppState>,
    Path(account_id): Path<Uuid>,
) -> Result<Json<AccountResponse>, CoordinatorError> {
    let record = state
        .store
        .fetch_account(account_id)
        .await?
        .ok_or(CoordinatorError::AccountNotFound(account_id))?;

    Ok(Json(AccountResponse {
        id: record.id,
        balance_minor_units: record.balance.minor_units(),
        revision: record.revision,
    }))
}

/// GET /api/v1/notifications
async fn list_notifications(
    State(state): State<AppState>,
) -> Result<Json<Vec<NotificationResponse>>, CoordinatorError> {
    let records = state.notifications.list().await?;

    Ok(Json(
        records
            .into_iter()
            .map(|record| NotificationResponse {
                id: record.id,
                recipient: record.recipient,
                subject: record.subject,
                status: record.status.to_string(),
                created_at: record.created_at,
            })
            .collect(),
    ))
}

/// Build the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/transfers", post(submit_transfer))
        .route("/accounts", post(create_account))
        .route("/accounts/:id", get(get_account))
        .route("/notifications", get(list_notifications))
        .with_state(state)
}
