//! HTTP route handlers.

pub mod dlq;
pub mod health;
pub mod metrics;
