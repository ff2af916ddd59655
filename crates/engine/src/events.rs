//! Event types and payloads written to the outbox.
//!
//! Event type names are derived from the status an entity moved into, so
//! consumers can route on strings like `LineItemShipped` or `OrderCompleted`
//! without parsing the payload.

use chrono::{DateTime, Utc};
use common::{LineItemId, OrderId};
use domain::{FulfillmentStatus, ItemStatus, ItemType, OrderStatus, PaymentStatus};
use serde::{Deserialize, Serialize};

/// Event type emitted when a new order is accepted.
pub const ORDER_PLACED: &str = "OrderPlaced";

/// Event type for a line item landing in `to`, e.g. `LineItemDelivered`.
pub fn line_item_event_type(to: ItemStatus) -> String {
    format!("LineItem{}", to.event_fragment())
}

/// Event type for an order landing in `to`, e.g. `OrderPartiallyRefunded`.
pub fn order_event_type(to: OrderStatus) -> String {
    format!("Order{}", to.event_fragment())
}

/// One line item as it appears in the `OrderPlaced` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacedItemData {
    pub line_item_id: LineItemId,
    pub item_type: ItemType,
}

/// Payload for `OrderPlaced`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPlacedData {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub items: Vec<PlacedItemData>,
    pub occurred_at: DateTime<Utc>,
}

/// Payload for `LineItem*` status change events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItemStatusChangedData {
    pub order_id: OrderId,
    pub line_item_id: LineItemId,
    pub item_type: ItemType,
    pub from: ItemStatus,
    pub to: ItemStatus,
    /// Coarse rollup the item sits in after the move.
    pub fulfillment_status: FulfillmentStatus,
    pub actor: String,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Payload for `Order*` status change events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderStatusChangedData {
    pub order_id: OrderId,
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub payment_status: PaymentStatus,
    pub occurred_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_names_follow_status_fragments() {
        assert_eq!(
            line_item_event_type(ItemStatus::PaymentConfirmed),
            "LineItemPaymentConfirmed"
        );
        assert_eq!(line_item_event_type(ItemStatus::NoShow), "LineItemNoShow");
        assert_eq!(
            order_event_type(OrderStatus::PartiallyRefunded),
            "OrderPartiallyRefunded"
        );
    }

    #[test]
    fn order_placed_payload_round_trips() {
        let order_id = OrderId::new();
        let line_item_id = LineItemId::new();
        let payload = OrderPlacedData {
            order_id,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            items: vec![PlacedItemData {
                line_item_id,
                item_type: ItemType::Physical,
            }],
            occurred_at: Utc::now(),
        };

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["status"], "pending");
        assert_eq!(json["items"][0]["item_type"], "physical");

        let back: OrderPlacedData = serde_json::from_value(json).unwrap();
        assert_eq!(back.order_id, order_id);
        assert_eq!(back.items[0].line_item_id, line_item_id);
    }

    #[test]
    fn line_item_payload_round_trips() {
        let payload = LineItemStatusChangedData {
            order_id: OrderId::new(),
            line_item_id: LineItemId::new(),
            item_type: ItemType::Digital,
            from: ItemStatus::PaymentConfirmed,
            to: ItemStatus::AccessGranted,
            fulfillment_status: FulfillmentStatus::Fulfilled,
            actor: "entitlement-service".to_string(),
            reason: None,
            occurred_at: Utc::now(),
        };

        let json = serde_json::to_string(&payload).unwrap();
        let back: LineItemStatusChangedData = serde_json::from_str(&json).unwrap();
        assert_eq!(back.from, ItemStatus::PaymentConfirmed);
        assert_eq!(back.to, ItemStatus::AccessGranted);
        assert_eq!(back.actor, "entitlement-service");
    }
}
