//! Worker Pool
//!
//! Background workers pulling command deliveries from the bus. Each
//! delivery is handled by exactly one worker at a time; after a crash the
//! transport may hand the same command to a different worker, which is
//! safe because the guard and the store carry the correctness burden.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::bus::MessageBus;

use super::{Disposition, TransferCoordinator};

/// A set of running consumer workers
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `count` workers consuming from the bus.
    /// Workers stop when the shutdown signal flips or the bus drains.
    pub fn spawn(
        count: usize,
        coordinator: Arc<TransferCoordinator>,
        bus: Arc<dyn MessageBus>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let handles = (0..count)
            .map(|worker_id| {
                let coordinator = coordinator.clone();
                let bus = bus.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    run_worker(worker_id, coordinator, bus, shutdown).await;
                })
            })
            .collect();

        Self { handles }
    }

    /// Wait for every worker to exit.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Worker task panicked");
            }
        }
    }
}

async fn run_worker(
    worker_id: usize,
    coordinator: Arc<TransferCoordinator>,
    bus: Arc<dyn MessageBus>,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!(worker_id, "Worker started");

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
            received = bus.receive() => {
                match received {
                    Ok(Some(delivery)) => {
                        settle(&coordinator, bus.as_ref(), delivery).await;
                    }
                    Ok(None) => {
                        tracing::info!(worker_id, "Bus drained; worker exiting");
                        break;
                    }
                    Err(e) => {
                        tracing::error!(worker_id, error = %e, "Receive failed");
                        break;
                    }
                }
            }
        }
    }

    tracing::info!(worker_id, "Worker stopped");
}

async fn settle(
    coordinator: &TransferCoordinator,
    bus: &dyn MessageBus,
    delivery: crate::bus::Delivery,
) {
    match coordinator.process(&delivery).await {
        Disposition::Completed => {
            if let Err(e) = bus.ack(delivery.receipt).await {
                tracing::error!(error = %e, "Ack failed");
            }
        }
        Disposition::Retry(cause) => {
            tracing::warn!(
                message_id = %delivery.envelope.message_id,
                attempt = delivery.attempt,
                error = %cause,
                "Returning command for redelivery"
            );
            if let Err(e) = bus.nack(delivery.receipt).await {
                tracing::error!(error = %e, "Nack failed");
            }
        }
        Disposition::DeadLetter(reason) => {
            if let Err(e) = bus
                .dead_letter(delivery.envelope.clone(), reason)
                .await
            {
                tracing::error!(error = %e, "Dead-letter failed");
            }
            if let Err(e) = bus.ack(delivery.receipt).await {
                tracing::error!(error = %e, "Ack failed");
            }
        }
    }
}
