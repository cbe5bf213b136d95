//! API module
//!
//! HTTP ingress and ops endpoints.

pub mod routes;

pub use routes::{create_router, AppState};
