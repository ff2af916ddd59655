//! Domain error types.

use thiserror::Error;

use crate::item::{ItemStatus, ItemType};

/// Errors that can occur while evaluating the fulfillment model.
#[derive(Debug, Error)]
pub enum FulfillmentError {
    /// The requested status change is not in the item type's transition table.
    #[error("Invalid transition for {item_type} item: {from} -> {to}")]
    InvalidTransition {
        item_type: ItemType,
        from: ItemStatus,
        to: ItemStatus,
    },

    /// A status string outside the closed set was encountered.
    #[error("Unknown item status: {value}")]
    UnknownStatus { value: String },

    /// An item type string outside the closed set was encountered.
    #[error("Unknown item type: {value}")]
    UnknownItemType { value: String },

    /// An order status string outside the closed set was encountered.
    #[error("Unknown order status: {value}")]
    UnknownOrderStatus { value: String },

    /// A payment status string outside the closed set was encountered.
    #[error("Unknown payment status: {value}")]
    UnknownPaymentStatus { value: String },

    /// A fulfillment status string outside the closed set was encountered.
    #[error("Unknown fulfillment status: {value}")]
    UnknownFulfillmentStatus { value: String },

    /// Fulfillment data of one kind was attached to an item of another type.
    #[error("{kind} fulfillment data does not apply to {item_type} items")]
    FulfillmentDataMismatch {
        kind: &'static str,
        item_type: ItemType,
    },
}
