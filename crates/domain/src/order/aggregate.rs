use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use common::{LineItemId, OrderId, Revision};

use crate::item::{ItemType, LineItem};

use super::coordinator::{derive_order_status, derive_payment_status};
use super::status::{OrderStatus, PaymentStatus};

/// An order: a set of line items plus the statuses derived from them.
///
/// `status` and `payment_status` are never assigned by callers; they change
/// only through [`Order::recompute`] after an item moved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub items: Vec<LineItem>,
    pub revision: Revision,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Creates an order with one pending item per requested type.
    pub fn new(item_types: Vec<ItemType>, now: DateTime<Utc>) -> Self {
        Self::with_id(OrderId::new(), item_types, now)
    }

    /// Creates an order with a caller-supplied ID.
    pub fn with_id(id: OrderId, item_types: Vec<ItemType>, now: DateTime<Utc>) -> Self {
        let items = item_types
            .into_iter()
            .map(|item_type| LineItem::new(id, item_type))
            .collect();
        Self {
            id,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            items,
            revision: Revision::initial(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Looks up an item by ID.
    pub fn item(&self, item_id: LineItemId) -> Option<&LineItem> {
        self.items.iter().find(|item| item.id == item_id)
    }

    /// Swaps in the next state of an item, matching on its ID. Returns false
    /// when the order has no such item.
    pub fn replace_item(&mut self, updated: LineItem) -> bool {
        match self.items.iter_mut().find(|item| item.id == updated.id) {
            Some(slot) => {
                *slot = updated;
                true
            }
            None => false,
        }
    }

    /// Re-derives `status` and `payment_status` from the items.
    ///
    /// Returns `Some((from, to))` only when the order status actually
    /// changed, so callers can record the order-level transition without
    /// ever logging a no-op. An order with no items is left untouched.
    pub fn recompute(&mut self, now: DateTime<Utc>) -> Option<(OrderStatus, OrderStatus)> {
        if self.items.is_empty() {
            return None;
        }

        let next_payment = derive_payment_status(&self.items);
        let payment_changed = next_payment != self.payment_status;
        self.payment_status = next_payment;

        let next_status = derive_order_status(&self.items);
        if next_status != self.status {
            let from = self.status;
            self.status = next_status;
            self.updated_at = now;
            Some((from, next_status))
        } else {
            if payment_changed {
                self.updated_at = now;
            }
            None
        }
    }
}
