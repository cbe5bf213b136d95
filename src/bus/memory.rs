//! In-memory Message Bus
//!
//! Process-local bus with the semantics the coordinator depends on:
//! at-least-once delivery, per-message attempt counts, an inspectable
//! dead-letter sink and a broadcast topic for outbound events. Stands in
//! for the durable broker in tests and the self-contained demo wiring.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use crate::domain::{CommandEnvelope, EventEnvelope};

use super::{BusError, Delivery, MessageBus, Receipt};

const EVENT_TOPIC_CAPACITY: usize = 1024;

/// A command that exhausted its retries, parked for manual inspection
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub envelope: CommandEnvelope,
    pub reason: String,
    pub parked_at: DateTime<Utc>,
}

/// In-process message bus
pub struct InMemoryBus {
    command_tx: Mutex<Option<mpsc::UnboundedSender<(CommandEnvelope, u32)>>>,
    command_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<(CommandEnvelope, u32)>>,
    inflight: Mutex<HashMap<Receipt, (CommandEnvelope, u32)>>,
    event_tx: broadcast::Sender<EventEnvelope>,
    published: Mutex<Vec<EventEnvelope>>,
    dead_letters: Mutex<Vec<DeadLetter>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, _) = broadcast::channel(EVENT_TOPIC_CAPACITY);

        Self {
            command_tx: Mutex::new(Some(command_tx)),
            command_rx: tokio::sync::Mutex::new(command_rx),
            inflight: Mutex::new(HashMap::new()),
            event_tx,
            published: Mutex::new(Vec::new()),
            dead_letters: Mutex::new(Vec::new()),
        }
    }

    /// Close the inbound queue. Pending commands still drain; receivers
    /// get `None` afterwards.
    pub fn close(&self) {
        self.command_tx.lock().expect("bus lock poisoned").take();
    }

    /// Snapshot of every event published so far, in publish order.
    pub fn published_events(&self) -> Vec<EventEnvelope> {
        self.published.lock().expect("bus lock poisoned").clone()
    }

    /// Snapshot of the dead-letter sink.
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dead_letters.lock().expect("bus lock poisoned").clone()
    }

    fn enqueue(&self, envelope: CommandEnvelope, attempt: u32) -> Result<(), BusError> {
        let tx = self.command_tx.lock().expect("bus lock poisoned");
        match tx.as_ref() {
            Some(tx) => tx.send((envelope, attempt)).map_err(|_| BusError::Closed),
            None => Err(BusError::Closed),
        }
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn send_command(&self, envelope: CommandEnvelope) -> Result<(), BusError> {
        self.enqueue(envelope, 1)
    }

    async fn receive(&self) -> Result<Option<Delivery>, BusError> {
        let mut rx = self.command_rx.lock().await;
        match rx.recv().await {
            Some((envelope, attempt)) => {
                let receipt = Receipt(Uuid::new_v4());
                self.inflight
                    .lock()
                    .expect("bus lock poisoned")
                    .insert(receipt, (envelope.clone(), attempt));
                Ok(Some(Delivery {
                    envelope,
                    attempt,
                    receipt,
                }))
            }
            None => Ok(None),
        }
    }

    async fn ack(&self, receipt: Receipt) -> Result<(), BusError> {
        self.inflight
            .lock()
            .expect("bus lock poisoned")
            .remove(&receipt);
        Ok(())
    }

    async fn nack(&self, receipt: Receipt) -> Result<(), BusError> {
        let entry = self
            .inflight
            .lock()
            .expect("bus lock poisoned")
            .remove(&receipt);

        match entry {
            Some((envelope, attempt)) => self.enqueue(envelope, attempt + 1),
            // Already settled; redelivery makes double settlement routine
            None => Ok(()),
        }
    }

    async fn publish(&self, event: EventEnvelope) -> Result<(), BusError> {
        self.published
            .lock()
            .expect("bus lock poisoned")
            .push(event.clone());

        // A send error only means no subscriber is currently listening
        let _ = self.event_tx.send(event);
        Ok(())
    }

    async fn dead_letter(
        &self,
        envelope: CommandEnvelope,
        reason: String,
    ) -> Result<(), BusError> {
        tracing::warn!(
            message_id = %envelope.message_id,
            reason = %reason,
            "Command dead-lettered"
        );

        self.dead_letters
            .lock()
            .expect("bus lock poisoned")
            .push(DeadLetter {
                envelope,
                reason,
                parked_at: Utc::now(),
            });
        Ok(())
    }

    fn subscribe_events(&self) -> broadcast::Receiver<EventEnvelope> {
        self.event_tx.subscribe()
    }
}
