use thiserror::Error;
use uuid::Uuid;

use common::{DlqEntryId, EventId, LineItemId, OrderId, Revision};

/// Errors that can occur when interacting with the lifecycle store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A revision check failed: another writer committed first. The caller
    /// must reload and retry the whole operation.
    #[error(
        "Concurrent modification of {entity} {id}: expected revision {expected}, found {actual}"
    )]
    ConcurrentModification {
        entity: &'static str,
        id: Uuid,
        expected: Revision,
        actual: Revision,
    },

    /// The order was not found.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The line item was not found.
    #[error("Line item not found: {0}")]
    LineItemNotFound(LineItemId),

    /// The outbox event was not found.
    #[error("Outbox event not found: {0}")]
    EventNotFound(EventId),

    /// The dead-letter queue entry was not found.
    #[error("DLQ entry not found: {0}")]
    DlqEntryNotFound(DlqEntryId),

    /// The dead-letter queue entry has already been reprocessed.
    #[error("DLQ entry {0} was already reprocessed")]
    AlreadyReprocessed(DlqEntryId),

    /// The transition commit failed validation before touching storage.
    #[error("Invalid commit: {0}")]
    InvalidCommit(String),

    /// A stored row holds a value outside the closed status sets.
    #[error("Stored row failed validation: {0}")]
    Decode(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<domain::FulfillmentError> for StoreError {
    fn from(err: domain::FulfillmentError) -> Self {
        StoreError::Decode(err.to_string())
    }
}

/// Result type for lifecycle store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
