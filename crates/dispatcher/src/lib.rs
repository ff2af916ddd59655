//! Outbox dispatcher: the delivery side of the lifecycle engine.
//!
//! The dispatcher polls the store for due events, claims a batch (one event
//! per aggregate, oldest first), and hands each to an [`EventPublisher`].
//! Successful publishes are marked processed; failures are rescheduled with
//! capped exponential backoff until retries run out and the event moves to
//! the dead letter queue. A sweeper returns events abandoned mid-claim by a
//! crashed worker.
//!
//! Delivery is at-least-once. Consumers deduplicate on the idempotency key
//! carried by every event.

pub mod backoff;
pub mod dispatcher;
pub mod dlq;
pub mod publisher;
pub mod webhook;

pub use backoff::BackoffPolicy;
pub use dispatcher::{DispatchStats, Dispatcher, DispatcherConfig};
pub use dlq::DlqHandler;
pub use publisher::{EventPublisher, InMemoryPublisher, PublishError, PublishedEvent};
pub use webhook::WebhookPublisher;
