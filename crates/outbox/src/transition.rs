use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use common::{LineItemId, OrderId};
use domain::{ItemStatus, OrderStatus};

/// What a status transition row is about: an order or a line item,
/// never both and never neither.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionSubject {
    Order(OrderId),
    LineItem(LineItemId),
}

impl TransitionSubject {
    /// Returns the order ID when the subject is an order.
    pub fn order_id(&self) -> Option<OrderId> {
        match self {
            TransitionSubject::Order(id) => Some(*id),
            TransitionSubject::LineItem(_) => None,
        }
    }

    /// Returns the line item ID when the subject is a line item.
    pub fn line_item_id(&self) -> Option<LineItemId> {
        match self {
            TransitionSubject::Order(_) => None,
            TransitionSubject::LineItem(id) => Some(*id),
        }
    }

    /// Splits the subject into the two nullable columns it is stored as.
    pub fn as_columns(&self) -> (Option<Uuid>, Option<Uuid>) {
        match self {
            TransitionSubject::Order(id) => (Some(id.as_uuid()), None),
            TransitionSubject::LineItem(id) => (None, Some(id.as_uuid())),
        }
    }

    /// Rebuilds the subject from the two nullable columns, rejecting rows
    /// where both or neither are set.
    pub fn from_columns(
        order_id: Option<Uuid>,
        line_item_id: Option<Uuid>,
    ) -> Result<Self, String> {
        match (order_id, line_item_id) {
            (Some(id), None) => Ok(TransitionSubject::Order(OrderId::from_uuid(id))),
            (None, Some(id)) => Ok(TransitionSubject::LineItem(LineItemId::from_uuid(id))),
            (Some(_), Some(_)) => Err("transition row has both order_id and line_item_id".into()),
            (None, None) => Err("transition row has neither order_id nor line_item_id".into()),
        }
    }
}

/// One append-only audit record of a status change.
///
/// Rows are only ever inserted, inside the same transaction as the state
/// change they record. Statuses are stored as strings but always originate
/// from the closed enums via the typed constructors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusTransition {
    pub id: Uuid,
    pub subject: TransitionSubject,
    pub from_status: String,
    pub to_status: String,
    pub reason: Option<String>,
    pub metadata: serde_json::Value,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl StatusTransition {
    /// Records a line item status change.
    pub fn for_item(
        line_item_id: LineItemId,
        from: ItemStatus,
        to: ItemStatus,
        created_by: impl Into<String>,
        reason: Option<String>,
        metadata: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            subject: TransitionSubject::LineItem(line_item_id),
            from_status: from.as_str().to_string(),
            to_status: to.as_str().to_string(),
            reason,
            metadata,
            created_by: created_by.into(),
            created_at: now,
        }
    }

    /// Records an order status change.
    pub fn for_order(
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
        created_by: impl Into<String>,
        reason: Option<String>,
        metadata: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            subject: TransitionSubject::Order(order_id),
            from_status: from.as_str().to_string(),
            to_status: to.as_str().to_string(),
            reason,
            metadata,
            created_by: created_by.into(),
            created_at: now,
        }
    }
}
