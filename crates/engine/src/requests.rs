//! Requests accepted by the fulfillment service.

use common::{LineItemId, OrderId};
use domain::{FulfillmentData, ItemStatus, ItemType};
use serde::{Deserialize, Serialize};

/// Request to place a new order with one line item per listed type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub order_id: OrderId,
    pub item_types: Vec<ItemType>,
}

impl PlaceOrder {
    /// Creates a placement request with a generated order id.
    pub fn new(item_types: Vec<ItemType>) -> Self {
        Self {
            order_id: OrderId::new(),
            item_types,
        }
    }

    /// Creates a placement request for a caller-chosen order id.
    pub fn with_id(order_id: OrderId, item_types: Vec<ItemType>) -> Self {
        Self {
            order_id,
            item_types,
        }
    }
}

/// Request to move one line item to a new status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub line_item_id: LineItemId,
    pub to_status: ItemStatus,

    /// Who asked for the change; recorded on the audit row and the event.
    pub actor: String,

    pub reason: Option<String>,
    pub metadata: serde_json::Value,

    /// Type-specific payload to attach alongside the transition, such as
    /// tracking details on shipment.
    pub fulfillment_data: Option<FulfillmentData>,
}

impl TransitionRequest {
    pub fn new(
        line_item_id: LineItemId,
        to_status: ItemStatus,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            line_item_id,
            to_status,
            actor: actor.into(),
            reason: None,
            metadata: serde_json::Value::Object(Default::default()),
            fulfillment_data: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_fulfillment_data(mut self, data: FulfillmentData) -> Self {
        self.fulfillment_data = Some(data);
        self
    }
}
