//! Idempotency module
//!
//! Deduplicates inbound messages using persisted message identifiers.

mod guard;

pub use guard::{GuardError, IdempotencyGuard, Reservation, ReservationToken};
