//! Notification module
//!
//! Consumes `NotificationRequested` events and forwards them to an email
//! provider, with its own idempotency check and retry policy.

mod dispatcher;
mod email;
mod store;

pub use dispatcher::NotificationDispatcher;
pub use email::{EmailProvider, HttpEmailProvider, LoggingEmailProvider, ProviderResult};
pub use store::{
    DeliveryStatus, MemoryNotificationStore, NotificationRecord, NotificationStore,
    PgNotificationStore,
};
