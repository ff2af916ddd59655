//! Engine error types.

use common::{LineItemId, OrderId};
use domain::FulfillmentError;
use outbox::StoreError;
use thiserror::Error;

/// Errors that can occur while orchestrating fulfillment.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Order not found.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// Line item not found.
    #[error("Line item not found: {0}")]
    LineItemNotFound(LineItemId),

    /// Fulfillment rule violation: illegal transition, unknown status, or
    /// mismatched fulfillment data.
    #[error("Fulfillment error: {0}")]
    Fulfillment(#[from] FulfillmentError),

    /// Persistence error, including revision conflicts a caller should
    /// retry from a fresh read.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    /// Returns true when the failure was a revision conflict, meaning the
    /// caller lost a race and should reload and retry.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            EngineError::Store(StoreError::ConcurrentModification { .. })
        )
    }
}

/// Convenience type alias for engine results.
pub type Result<T> = std::result::Result<T, EngineError>;
