//! Transfer Coordinator
//!
//! Drives each inbound command through
//! Received -> Validating -> Reserving -> Applying -> Emitting -> Completed,
//! with Failed reachable from every step. Correctness under redelivery
//! rests on the idempotency guard plus the store's atomic commit, never on
//! which worker handles the message.

mod worker;

pub use worker::WorkerPool;

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::time::timeout;
use uuid::Uuid;

use crate::bus::{BusError, Delivery, MessageBus};
use crate::domain::{
    CommandEnvelope, FailureReason, TransferCommand, TransferOutcome,
};
use crate::error::CoordinatorError;
use crate::idempotency::{GuardError, IdempotencyGuard, Reservation, ReservationToken};
use crate::store::{AccountWrite, LedgerStore, TransferApplication};

/// Retry and deadline bounds for command processing
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Local retries of the reserve/apply loop on transient store errors
    pub apply_retries: u32,

    /// Retries per event publish on a transiently failing bus
    pub publish_retries: u32,

    /// Transport deliveries before a command is dead-lettered
    pub max_delivery_attempts: u32,

    /// Base delay for exponential backoff
    pub backoff_base: Duration,

    /// End-to-end deadline per processing attempt
    pub command_deadline: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            apply_retries: 3,
            publish_retries: 3,
            max_delivery_attempts: 5,
            backoff_base: Duration::from_millis(50),
            command_deadline: Duration::from_secs(30),
        }
    }
}

/// How the worker should settle a processed delivery
#[derive(Debug)]
pub enum Disposition {
    /// Effects are durable and events published: ack
    Completed,

    /// Transient failure with attempts left: nack for redelivery
    Retry(CoordinatorError),

    /// Exhausted or fatal: park in the dead-letter sink, then ack
    DeadLetter(String),
}

/// Coordinates transfer commands between the ledger store and the bus
pub struct TransferCoordinator {
    store: Arc<dyn LedgerStore>,
    guard: IdempotencyGuard,
    bus: Arc<dyn MessageBus>,
    policy: RetryPolicy,
}

impl TransferCoordinator {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        bus: Arc<dyn MessageBus>,
        policy: RetryPolicy,
    ) -> Self {
        let guard = IdempotencyGuard::new(store.clone());
        Self {
            store,
            guard,
            bus,
            policy,
        }
    }

    /// Process one delivery end to end and decide its settlement.
    pub async fn process(&self, delivery: &Delivery) -> Disposition {
        let result = timeout(
            self.policy.command_deadline,
            self.run(&delivery.envelope),
        )
        .await;

        match result {
            Err(_) => {
                tracing::error!(
                    message_id = %delivery.envelope.message_id,
                    "Command abandoned: processing deadline exceeded"
                );
                Disposition::DeadLetter(CoordinatorError::DeadlineExceeded.to_string())
            }
            Ok(Ok(())) => Disposition::Completed,
            Ok(Err(e)) if e.is_transient() && delivery.attempt < self.policy.max_delivery_attempts => {
                Disposition::Retry(e)
            }
            Ok(Err(e)) => Disposition::DeadLetter(e.to_string()),
        }
    }

    /// One full pass of the state machine.
    ///
    /// Permanent failures are settled here (rejection recorded, events
    /// emitted) and return `Ok`; only transient and fatal errors escape to
    /// the caller's retry/dead-letter handling.
    async fn run(&self, envelope: &CommandEnvelope) -> Result<(), CoordinatorError> {
        // Validating
        let command = match envelope.validate() {
            Ok(command) => command,
            Err(e) => {
                tracing::warn!(
                    message_id = %envelope.message_id,
                    error = %e,
                    "Rejecting malformed command"
                );
                // Validation is deterministic, so redelivery re-derives the
                // identical rejection without touching the store.
                let outcome = TransferOutcome::Rejected {
                    source_account_id: envelope.source_account_id,
                    amount_minor_units: envelope.amount_minor_units,
                    correlation_id: envelope.correlation_id,
                    reason: FailureReason::InvalidCommand,
                };
                return self.emit(envelope.message_id, &outcome).await;
            }
        };

        let fingerprint = envelope.fingerprint();

        // Reserving / Applying, with bounded retries on transient store errors
        let mut attempt: u32 = 0;
        let outcome = loop {
            let reservation = match self
                .guard
                .check_and_reserve(command.message_id, &fingerprint)
                .await
            {
                Ok(reservation) => reservation,
                Err(GuardError::FingerprintMismatch(id)) => {
                    tracing::warn!(message_id = %id, "Message id reused with a different payload");
                    let outcome = TransferOutcome::Rejected {
                        source_account_id: command.source_account_id,
                        amount_minor_units: command.amount.minor_units(),
                        correlation_id: command.correlation_id,
                        reason: FailureReason::InvalidCommand,
                    };
                    return self.emit(command.message_id, &outcome).await;
                }
                Err(GuardError::Storage(e)) => {
                    let err: CoordinatorError = e.into();
                    if err.is_transient() && attempt < self.policy.apply_retries {
                        attempt += 1;
                        let delay = self.backoff_delay(attempt);
                        tracing::warn!(
                            message_id = %command.message_id,
                            error = %err,
                            attempt,
                            "Transient failure reserving message; retrying"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(err);
                }
            };

            match reservation {
                Reservation::AlreadyProcessed(outcome) => {
                    tracing::debug!(
                        message_id = %command.message_id,
                        "Redelivery of a processed message; re-emitting stored outcome"
                    );
                    break outcome;
                }
                Reservation::Fresh(token) => {
                    match self.apply_once(&command, token).await {
                        Ok(outcome) => break outcome,
                        Err(e) if e.is_transient() && attempt < self.policy.apply_retries => {
                            attempt += 1;
                            let delay = self.backoff_delay(attempt);
                            tracing::warn!(
                                message_id = %command.message_id,
                                error = %e,
                                attempt,
                                "Transient failure applying transfer; retrying"
                            );
                            tokio::time::sleep(delay).await;
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
        };

        // Emitting
        self.emit(command.message_id, &outcome).await
    }

    /// One apply attempt: read both accounts, validate, commit atomically.
    /// Business rejections are recorded through the same reservation token
    /// so the guard finalizes in the transaction that settles the command.
    async fn apply_once(
        &self,
        command: &TransferCommand,
        token: ReservationToken,
    ) -> Result<TransferOutcome, CoordinatorError> {
        let source = match self.store.fetch_account(command.source_account_id).await? {
            Some(account) => account,
            None => {
                return self
                    .record_rejection(command, token, FailureReason::AccountNotFound)
                    .await;
            }
        };

        let destination = match self
            .store
            .fetch_account(command.destination_account_id)
            .await?
        {
            Some(account) => account,
            None => {
                return self
                    .record_rejection(command, token, FailureReason::AccountNotFound)
                    .await;
            }
        };

        if !source.balance.is_sufficient_for(&command.amount) {
            tracing::info!(
                message_id = %command.message_id,
                account_id = %source.id,
                required = command.amount.minor_units(),
                available = source.balance.minor_units(),
                "Transfer rejected: insufficient funds"
            );
            return self
                .record_rejection(command, token, FailureReason::InsufficientFunds)
                .await;
        }

        let debited = source
            .balance
            .debit(&command.amount)
            .map_err(|e| CoordinatorError::Internal(e.to_string()))?;
        let credited = destination
            .balance
            .credit(&command.amount)
            .map_err(|e| CoordinatorError::Internal(e.to_string()))?;

        let outcome = TransferOutcome::Applied {
            source_account_id: command.source_account_id,
            destination_account_id: command.destination_account_id,
            amount_minor_units: command.amount.minor_units(),
            correlation_id: command.correlation_id,
        };

        self.store
            .commit_transfer(TransferApplication {
                record: token.finalize(outcome.clone()),
                debit: AccountWrite {
                    account_id: source.id,
                    expected_revision: source.revision,
                    new_balance: debited,
                },
                credit: AccountWrite {
                    account_id: destination.id,
                    expected_revision: destination.revision,
                    new_balance: credited,
                },
            })
            .await?;

        tracing::info!(
            message_id = %command.message_id,
            source = %command.source_account_id,
            destination = %command.destination_account_id,
            amount = command.amount.minor_units(),
            "Transfer applied"
        );

        Ok(outcome)
    }

    /// Persist a business rejection so redelivery returns the same answer.
    async fn record_rejection(
        &self,
        command: &TransferCommand,
        token: ReservationToken,
        reason: FailureReason,
    ) -> Result<TransferOutcome, CoordinatorError> {
        let outcome = TransferOutcome::Rejected {
            source_account_id: command.source_account_id,
            amount_minor_units: command.amount.minor_units(),
            correlation_id: command.correlation_id,
            reason,
        };

        self.store.record_outcome(token.finalize(outcome.clone())).await?;
        Ok(outcome)
    }

    /// Publish the outcome's events, retrying transient bus failures.
    /// Event ids are derived from the message id, so a partial publish
    /// followed by a retry hands downstream consumers dedupable duplicates.
    async fn emit(
        &self,
        message_id: Uuid,
        outcome: &TransferOutcome,
    ) -> Result<(), CoordinatorError> {
        for envelope in outcome.outbound_events(message_id) {
            let mut attempt: u32 = 0;
            loop {
                match self.bus.publish(envelope.clone()).await {
                    Ok(()) => break,
                    Err(BusError::Unavailable(msg)) if attempt < self.policy.publish_retries => {
                        attempt += 1;
                        let delay = self.backoff_delay(attempt);
                        tracing::warn!(
                            message_id = %message_id,
                            event_type = envelope.event.event_type(),
                            error = %msg,
                            attempt,
                            "Publish failed; retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }

        Ok(())
    }

    /// Exponential backoff with uniform jitter
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.policy.backoff_base;
        let exp = base.saturating_mul(1u32 << attempt.min(10).saturating_sub(1));
        let jitter = rand::thread_rng().gen_range(0..=base.as_millis() as u64);
        exp + Duration::from_millis(jitter)
    }
}
