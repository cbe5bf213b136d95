//! Notification Dispatcher
//!
//! Subscribes to the outbound topic, reacts to `NotificationRequested`
//! events and drives the email provider. Transient provider failures are
//! retried with capped exponential backoff; permanent failures are
//! recorded and never retried. Duplicate events (redelivered commands
//! re-emit their event set) are skipped via the notification store.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::domain::{EventEnvelope, OutboundEvent};
use crate::store::StoreError;

use super::{
    DeliveryStatus, EmailProvider, NotificationRecord, NotificationStore, ProviderResult,
};

/// Consumes notification requests from the bus and forwards them to the
/// email provider.
pub struct NotificationDispatcher {
    store: Arc<dyn NotificationStore>,
    provider: Arc<dyn EmailProvider>,
    retry_cap: u32,
    backoff_base: Duration,
}

impl NotificationDispatcher {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        provider: Arc<dyn EmailProvider>,
        retry_cap: u32,
        backoff_base: Duration,
    ) -> Self {
        Self {
            store,
            provider,
            retry_cap,
            backoff_base,
        }
    }

    /// Start the consumer loop in the background.
    pub fn start(
        self: Arc<Self>,
        events: broadcast::Receiver<EventEnvelope>,
        shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run(events, shutdown).await;
        })
    }

    async fn run(
        &self,
        mut events: broadcast::Receiver<EventEnvelope>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        tracing::info!("Notification dispatcher started");

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                received = events.recv() => {
                    match received {
                        Ok(envelope) => {
                            if let Err(e) = self.handle(&envelope).await {
                                tracing::error!(
                                    event_id = %envelope.event_id,
                                    error = %e,
                                    "Notification handling failed"
                                );
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Notification dispatcher lagged behind the topic");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }

        tracing::info!("Notification dispatcher stopped");
    }

    /// Handle one event from the topic. Non-notification events and
    /// already-handled event ids are skipped.
    pub async fn handle(&self, envelope: &EventEnvelope) -> Result<(), StoreError> {
        let (account_id, amount, correlation_id) = match &envelope.event {
            OutboundEvent::NotificationRequested {
                account_id,
                amount_minor_units,
                correlation_id,
            } => (*account_id, *amount_minor_units, *correlation_id),
            _ => return Ok(()),
        };

        if self.store.fetch(envelope.event_id).await?.is_some() {
            tracing::debug!(
                event_id = %envelope.event_id,
                "Duplicate notification request; skipping"
            );
            return Ok(());
        }

        let recipient = recipient_for(account_id);
        let subject = "Transfer completed".to_string();
        let body = format!(
            "A transfer of {} minor units on your account has completed. Reference: {}",
            amount, correlation_id
        );

        let status = self.deliver(&recipient, &subject, &body).await;
        if let DeliveryStatus::Failed { reason } = &status {
            tracing::warn!(
                event_id = %envelope.event_id,
                recipient = %recipient,
                reason = %reason,
                "Notification not delivered"
            );
        }

        self.store
            .insert(NotificationRecord {
                id: envelope.event_id,
                recipient,
                subject,
                body,
                status,
                created_at: chrono::Utc::now(),
            })
            .await
    }

    /// Drive the provider until delivery, a permanent failure, or the
    /// retry cap.
    async fn deliver(&self, recipient: &str, subject: &str, body: &str) -> DeliveryStatus {
        let mut attempt: u32 = 0;

        loop {
            match self.provider.send(recipient, subject, body).await {
                ProviderResult::Delivered => return DeliveryStatus::Delivered,
                ProviderResult::PermanentFailure(reason) => {
                    return DeliveryStatus::Failed { reason };
                }
                ProviderResult::TransientFailure(reason) if attempt < self.retry_cap => {
                    attempt += 1;
                    let delay = self.backoff_base * (1u32 << attempt.min(10));
                    tracing::warn!(
                        recipient,
                        error = %reason,
                        attempt,
                        "Transient provider failure; retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                ProviderResult::TransientFailure(reason) => {
                    return DeliveryStatus::Failed {
                        reason: format!("retries exhausted: {}", reason),
                    };
                }
            }
        }
    }
}

/// Resolve an account to its owner's address.
/// Account-to-recipient mapping lives with the account-profile service;
/// this derivation stands in for that lookup.
fn recipient_for(account_id: Uuid) -> String {
    format!("account-{}@mail.bank-mesh.example", account_id.simple())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::MemoryNotificationStore;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Provider returning a scripted sequence of results
    struct ScriptedProvider {
        script: Mutex<VecDeque<ProviderResult>>,
        calls: Mutex<u32>,
    }

    impl ScriptedProvider {
        fn new(script: Vec<ProviderResult>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl EmailProvider for ScriptedProvider {
        async fn send(&self, _recipient: &str, _subject: &str, _body: &str) -> ProviderResult {
            *self.calls.lock().unwrap() += 1;
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(ProviderResult::Delivered)
        }
    }

    fn request_envelope() -> EventEnvelope {
        EventEnvelope::derived(
            Uuid::new_v4(),
            OutboundEvent::NotificationRequested {
                account_id: Uuid::new_v4(),
                amount_minor_units: 500,
                correlation_id: Uuid::new_v4(),
            },
        )
    }

    fn dispatcher(
        provider: Arc<ScriptedProvider>,
    ) -> (NotificationDispatcher, Arc<MemoryNotificationStore>) {
        let store = Arc::new(MemoryNotificationStore::new());
        let dispatcher = NotificationDispatcher::new(
            store.clone(),
            provider,
            2,
            Duration::from_millis(1),
        );
        (dispatcher, store)
    }

    #[tokio::test]
    async fn test_delivered_and_recorded() {
        let provider = Arc::new(ScriptedProvider::new(vec![ProviderResult::Delivered]));
        let (dispatcher, store) = dispatcher(provider.clone());

        let envelope = request_envelope();
        dispatcher.handle(&envelope).await.unwrap();

        let record = store.fetch(envelope.event_id).await.unwrap().unwrap();
        assert_eq!(record.status, DeliveryStatus::Delivered);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_transient_failure_retries_then_delivers() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            ProviderResult::TransientFailure("timeout".to_string()),
            ProviderResult::TransientFailure("timeout".to_string()),
            ProviderResult::Delivered,
        ]));
        let (dispatcher, store) = dispatcher(provider.clone());

        let envelope = request_envelope();
        dispatcher.handle(&envelope).await.unwrap();

        assert_eq!(provider.calls(), 3);
        let record = store.fetch(envelope.event_id).await.unwrap().unwrap();
        assert_eq!(record.status, DeliveryStatus::Delivered);
    }

    #[tokio::test]
    async fn test_retry_cap_exhaustion_is_recorded() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            ProviderResult::TransientFailure("timeout".to_string()),
            ProviderResult::TransientFailure("timeout".to_string()),
            ProviderResult::TransientFailure("timeout".to_string()),
        ]));
        let (dispatcher, store) = dispatcher(provider.clone());

        let envelope = request_envelope();
        dispatcher.handle(&envelope).await.unwrap();

        // retry_cap = 2 means three attempts total
        assert_eq!(provider.calls(), 3);
        let record = store.fetch(envelope.event_id).await.unwrap().unwrap();
        assert!(matches!(record.status, DeliveryStatus::Failed { .. }));
    }

    #[tokio::test]
    async fn test_permanent_failure_not_retried() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            ProviderResult::PermanentFailure("invalid recipient".to_string()),
        ]));
        let (dispatcher, store) = dispatcher(provider.clone());

        let envelope = request_envelope();
        dispatcher.handle(&envelope).await.unwrap();

        assert_eq!(provider.calls(), 1);
        let record = store.fetch(envelope.event_id).await.unwrap().unwrap();
        assert!(matches!(record.status, DeliveryStatus::Failed { .. }));
    }

    #[tokio::test]
    async fn test_duplicate_event_skipped() {
        let provider = Arc::new(ScriptedProvider::new(vec![ProviderResult::Delivered]));
        let (dispatcher, store) = dispatcher(provider.clone());

        let envelope = request_envelope();
        dispatcher.handle(&envelope).await.unwrap();
        dispatcher.handle(&envelope).await.unwrap();

        assert_eq!(provider.calls(), 1);
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_other_events_ignored() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let (dispatcher, store) = dispatcher(provider.clone());

        let envelope = EventEnvelope::derived(
            Uuid::new_v4(),
            OutboundEvent::BalanceDebited {
                account_id: Uuid::new_v4(),
                amount_minor_units: 500,
                correlation_id: Uuid::new_v4(),
            },
        );
        dispatcher.handle(&envelope).await.unwrap();

        assert_eq!(provider.calls(), 0);
        assert!(store.list().await.unwrap().is_empty());
    }
}
