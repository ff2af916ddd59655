//! Persistence layer for the order lifecycle engine.
//!
//! This crate owns everything that touches storage:
//! - The transactional outbox rows ([`OutboxEvent`]) and their idempotency keys
//! - The append-only status transition log ([`StatusTransition`])
//! - Dead-letter queue entries ([`DlqEntry`])
//! - The [`LifecycleStore`] trait, with in-memory and PostgreSQL
//!   implementations that share the same claim, ordering, and conflict
//!   semantics
//!
//! State mutations, audit rows, and outbox rows are committed in one
//! transaction through [`LifecycleStore::commit_transition`]; nothing in this
//! crate ever enqueues an event outside the transaction that produced it.

pub mod dlq;
pub mod error;
pub mod event;
pub mod idempotency;
pub mod memory;
pub mod postgres;
pub mod store;
pub mod transition;

pub use dlq::DlqEntry;
pub use error::{Result, StoreError};
pub use event::{AggregateKind, EventStatus, OutboxEvent};
pub use idempotency::idempotency_key;
pub use memory::InMemoryLifecycleStore;
pub use postgres::PostgresLifecycleStore;
pub use store::{LifecycleStore, OrderStatusUpdate, TransitionCommit, validate_commit};
pub use transition::{StatusTransition, TransitionSubject};
