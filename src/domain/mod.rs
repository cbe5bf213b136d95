//! Domain module
//!
//! Core domain types and business rules.

pub mod amount;
pub mod command;
pub mod events;

pub use amount::{Amount, AmountError, Balance};
pub use command::{CommandEnvelope, CommandError, TransferCommand};
pub use events::{
    EventEnvelope, FailureReason, OutboundEvent, ProcessedMessage, TransferOutcome,
};
