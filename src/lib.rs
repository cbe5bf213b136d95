//! bank-mesh Library
//!
//! Message-driven funds-transfer coordinator: commands arrive over an
//! at-least-once bus, balances move through an atomically-guarded ledger
//! store, and follow-up events feed the notification dispatcher.
//! Re-exports modules for integration testing and external use.

pub mod api;
pub mod bus;
pub mod coordinator;
pub mod domain;
pub mod idempotency;
pub mod notify;
pub mod store;

// Private modules (used only by the binary)
pub mod config;
pub mod db;
mod error;

pub use config::Config;
pub use error::{AppResult, CoordinatorError};
pub use domain::{Amount, AmountError, Balance, CommandEnvelope, TransferCommand};
pub use domain::{EventEnvelope, FailureReason, OutboundEvent, TransferOutcome};
