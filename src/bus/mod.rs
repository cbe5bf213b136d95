//! Message Bus Adapter
//!
//! Send/receive primitive over a durable queue with at-least-once
//! delivery. Commands flow in on the queue; events flow out on a topic.
//! Delivery is acknowledged only after processing; an unacknowledged or
//! nacked delivery comes back with a bumped attempt counter.

mod memory;

pub use memory::{DeadLetter, InMemoryBus};

use async_trait::async_trait;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::domain::{CommandEnvelope, EventEnvelope};

/// One delivery of a command message. The same message may be delivered
/// more than once; `attempt` counts deliveries of this message so far.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub envelope: CommandEnvelope,
    pub attempt: u32,
    pub receipt: Receipt,
}

/// Opaque handle used to settle a delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Receipt(pub(crate) Uuid);

/// Bus errors
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// The bus is shut down; no further sends or receives
    #[error("Bus is closed")]
    Closed,

    /// Transport failure; retry with backoff
    #[error("Bus unavailable: {0}")]
    Unavailable(String),
}

/// At-least-once message transport.
///
/// Settlement rules: `ack` after the command's effects are durable,
/// `nack` to redeliver, `dead_letter` to park it for manual inspection.
/// Settling an already-settled receipt is a no-op, as redelivery makes
/// double settlement unavoidable.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Enqueue a command for processing.
    async fn send_command(&self, envelope: CommandEnvelope) -> Result<(), BusError>;

    /// Long-poll the next command delivery.
    /// Returns `Ok(None)` once the bus is closed and drained.
    async fn receive(&self) -> Result<Option<Delivery>, BusError>;

    /// Settle a delivery as processed.
    async fn ack(&self, receipt: Receipt) -> Result<(), BusError>;

    /// Return a delivery to the queue for another attempt.
    async fn nack(&self, receipt: Receipt) -> Result<(), BusError>;

    /// Publish an event on the outbound topic.
    async fn publish(&self, event: EventEnvelope) -> Result<(), BusError>;

    /// Park a command in the dead-letter sink.
    async fn dead_letter(&self, envelope: CommandEnvelope, reason: String)
        -> Result<(), BusError>;

    /// Subscribe to the outbound topic.
    fn subscribe_events(&self) -> broadcast::Receiver<EventEnvelope>;
}
