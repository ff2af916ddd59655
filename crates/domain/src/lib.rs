//! Domain layer for the order lifecycle engine.
//!
//! This crate provides the pure fulfillment model:
//! - Per-type line item state machines driven by static policy tables
//! - `LineItem` with an append-only status history
//! - `Order` with status and payment status derived from its items
//!
//! Nothing in this crate performs I/O or reads clocks; timestamps are always
//! passed in by the caller.

pub mod error;
pub mod item;
pub mod order;

pub use error::FulfillmentError;
pub use item::{
    FulfillmentData, FulfillmentPolicy, FulfillmentStatus, ItemStatus, ItemType, LineItem,
    StatusChange,
};
pub use order::{Order, OrderStatus, PaymentStatus, derive_order_status, derive_payment_status};
