//! Outbound Events
//!
//! Events emitted by the coordinator after processing a transfer command.
//! Events are immutable facts; downstream services (balance projections,
//! notification dispatch) consume them from the bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Events published on the outbound topic.
///
/// Wire format is a tagged envelope:
/// `{type, accountId, amountMinorUnits, correlationId, reason?}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all_fields = "camelCase")]
pub enum OutboundEvent {
    /// The source account was debited
    BalanceDebited {
        account_id: Uuid,
        amount_minor_units: i64,
        correlation_id: Uuid,
    },

    /// The destination account was credited
    BalanceCredited {
        account_id: Uuid,
        amount_minor_units: i64,
        correlation_id: Uuid,
    },

    /// The transfer was rejected or abandoned
    TransferFailed {
        account_id: Uuid,
        amount_minor_units: i64,
        correlation_id: Uuid,
        reason: FailureReason,
    },

    /// A notification should be sent to the initiating account's owner
    NotificationRequested {
        account_id: Uuid,
        amount_minor_units: i64,
        correlation_id: Uuid,
    },
}

impl OutboundEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            OutboundEvent::BalanceDebited { .. } => "BalanceDebited",
            OutboundEvent::BalanceCredited { .. } => "BalanceCredited",
            OutboundEvent::TransferFailed { .. } => "TransferFailed",
            OutboundEvent::NotificationRequested { .. } => "NotificationRequested",
        }
    }

    /// Get the account ID this event relates to
    pub fn account_id(&self) -> Uuid {
        match self {
            OutboundEvent::BalanceDebited { account_id, .. } => *account_id,
            OutboundEvent::BalanceCredited { account_id, .. } => *account_id,
            OutboundEvent::TransferFailed { account_id, .. } => *account_id,
            OutboundEvent::NotificationRequested { account_id, .. } => *account_id,
        }
    }

    /// Get the correlation ID this event carries
    pub fn correlation_id(&self) -> Uuid {
        match self {
            OutboundEvent::BalanceDebited { correlation_id, .. } => *correlation_id,
            OutboundEvent::BalanceCredited { correlation_id, .. } => *correlation_id,
            OutboundEvent::TransferFailed { correlation_id, .. } => *correlation_id,
            OutboundEvent::NotificationRequested { correlation_id, .. } => *correlation_id,
        }
    }
}

/// Outbound event plus its identity on the wire.
///
/// The event id is derived deterministically from the command's message id
/// and the event type, so redelivered commands re-emit byte-identical
/// envelopes and downstream consumers can dedup by event id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    pub event_id: Uuid,
    #[serde(flatten)]
    pub event: OutboundEvent,
}

impl EventEnvelope {
    /// Wrap an event, deriving its id from the originating message id.
    pub fn derived(message_id: Uuid, event: OutboundEvent) -> Self {
        let event_id = derive_event_id(message_id, event.event_type());
        Self { event_id, event }
    }
}

/// Derive a stable event id from the command message id and event type.
fn derive_event_id(message_id: Uuid, event_type: &str) -> Uuid {
    let mut hasher = Sha256::new();
    hasher.update(message_id.as_bytes());
    hasher.update(event_type.as_bytes());
    let digest = hasher.finalize();

    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes)
}

/// Reasons why a transfer might fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Malformed command (non-positive amount, identical accounts)
    InvalidCommand,

    /// Source doesn't have enough balance
    InsufficientFunds,

    /// Source or destination account not found
    AccountNotFound,

    /// Revision-check retries exhausted
    ConcurrencyConflict,

    /// Command exceeded its end-to-end deadline
    DeadlineExceeded,

    /// Internal system error
    InternalError,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::InvalidCommand => write!(f, "Invalid command"),
            FailureReason::InsufficientFunds => write!(f, "Insufficient funds"),
            FailureReason::AccountNotFound => write!(f, "Account not found"),
            FailureReason::ConcurrencyConflict => write!(f, "Concurrency conflict"),
            FailureReason::DeadlineExceeded => write!(f, "Deadline exceeded"),
            FailureReason::InternalError => write!(f, "Internal error"),
        }
    }
}

/// The recorded result of processing one transfer command.
///
/// Persisted in `processed_messages` in the same transaction as the balance
/// mutation it guards; on redelivery the coordinator replays
/// `outbound_events` from this record instead of reapplying side effects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
#[serde(rename_all_fields = "camelCase")]
pub enum TransferOutcome {
    /// Both balance mutations committed
    Applied {
        source_account_id: Uuid,
        destination_account_id: Uuid,
        amount_minor_units: i64,
        correlation_id: Uuid,
    },

    /// Business-level rejection; no balance mutation
    Rejected {
        source_account_id: Uuid,
        amount_minor_units: i64,
        correlation_id: Uuid,
        reason: FailureReason,
    },
}

impl TransferOutcome {
    /// The exact event sequence this outcome publishes.
    ///
    /// Deterministic: the same message id always yields the same envelopes,
    /// which is what makes redelivered commands observably idempotent.
    pub fn outbound_events(&self, message_id: Uuid) -> Vec<EventEnvelope> {
        match self {
            TransferOutcome::Applied {
                source_account_id,
                destination_account_id,
                amount_minor_units,
                correlation_id,
            } => vec![
                EventEnvelope::derived(
                    message_id,
                    OutboundEvent::BalanceDebited {
                        account_id: *source_account_id,
                        amount_minor_units: *amount_minor_units,
                        correlation_id: *correlation_id,
                    },
                ),
                EventEnvelope::derived(
                    message_id,
                    OutboundEvent::BalanceCredited {
                        account_id: *destination_account_id,
                        amount_minor_units: *amount_minor_units,
                        correlation_id: *correlation_id,
                    },
                ),
                EventEnvelope::derived(
                    message_id,
                    OutboundEvent::NotificationRequested {
                        account_id: *source_account_id,
                        amount_minor_units: *amount_minor_units,
                        correlation_id: *correlation_id,
                    },
                ),
            ],
            TransferOutcome::Rejected {
                source_account_id,
                amount_minor_units,
                correlation_id,
                reason,
            } => vec![EventEnvelope::derived(
                message_id,
                OutboundEvent::TransferFailed {
                    account_id: *source_account_id,
                    amount_minor_units: *amount_minor_units,
                    correlation_id: *correlation_id,
                    reason: *reason,
                },
            )],
        }
    }

    /// Whether the transfer was applied
    pub fn is_applied(&self) -> bool {
        matches!(self, TransferOutcome::Applied { .. })
    }
}

/// A processed-message record: message id plus recorded outcome.
/// Append-only; created atomically with the mutation it guards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedMessage {
    pub message_id: Uuid,
    pub fingerprint: String,
    pub outcome: TransferOutcome,
    pub processed_at: DateTime<Utc>,
}

impl ProcessedMessage {
    pub fn new(message_id: Uuid, fingerprint: String, outcome: TransferOutcome) -> Self {
        Self {
            message_id,
            fingerprint,
            outcome,
            processed_at: Utc::now(),
        }
    }
}
