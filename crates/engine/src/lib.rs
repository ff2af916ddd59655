//! Fulfillment orchestration for the order lifecycle engine.
//!
//! This crate ties the per-item state machines to persistence. A transition
//! request is served in one pass:
//! 1. Load the item's order at its current revision
//! 2. Run the pure state machine transition (legality, history, projection)
//! 3. Recompute the derived order and payment statuses
//! 4. Commit the item, the order row, the audit rows, and the outbox rows
//!    in a single transaction, conditional on the revisions read in step 1
//!
//! A revision conflict surfaces as an error; callers retry from a fresh
//! read. Nothing is ever half-written.

pub mod error;
pub mod events;
pub mod requests;
pub mod service;

pub use error::{EngineError, Result};
pub use events::{
    LineItemStatusChangedData, OrderPlacedData, OrderStatusChangedData, PlacedItemData,
};
pub use requests::{PlaceOrder, TransitionRequest};
pub use service::FulfillmentService;
