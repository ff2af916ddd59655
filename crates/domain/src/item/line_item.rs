use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use common::{LineItemId, OrderId, Revision};

use crate::error::FulfillmentError;

use super::data::FulfillmentData;
use super::item_type::ItemType;
use super::policy::FulfillmentPolicy;
use super::status::{FulfillmentStatus, ItemStatus};

/// One entry in a line item's append-only status history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    pub from: ItemStatus,
    pub to: ItemStatus,
    pub changed_at: DateTime<Utc>,
    pub actor: String,
    pub reason: Option<String>,
    pub metadata: serde_json::Value,
}

/// A single line of an order, carrying its own fulfillment state machine.
///
/// Transitions are pure: [`LineItem::transition`] either returns the next
/// state of the item or an error, and the input item is never touched.
/// Persisting the result, and detecting concurrent writers through
/// `revision`, is the caller's business.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: LineItemId,
    pub order_id: OrderId,
    pub item_type: ItemType,
    pub status: ItemStatus,
    pub fulfillment_status: FulfillmentStatus,
    pub fulfillment_data: Option<FulfillmentData>,
    pub status_history: Vec<StatusChange>,
    pub last_status_change: Option<DateTime<Utc>>,
    pub revision: Revision,
}

impl LineItem {
    /// Creates a new item in its type's initial status.
    pub fn new(order_id: OrderId, item_type: ItemType) -> Self {
        Self::with_id(LineItemId::new(), order_id, item_type)
    }

    /// Creates a new item with a caller-supplied ID.
    pub fn with_id(id: LineItemId, order_id: OrderId, item_type: ItemType) -> Self {
        let policy = FulfillmentPolicy::for_type(item_type);
        Self {
            id,
            order_id,
            item_type,
            status: policy.initial(),
            fulfillment_status: policy.projection(policy.initial()),
            fulfillment_data: None,
            status_history: Vec::new(),
            last_status_change: None,
            revision: Revision::initial(),
        }
    }

    /// Returns the policy governing this item's transitions.
    pub fn policy(&self) -> &'static FulfillmentPolicy {
        FulfillmentPolicy::for_type(self.item_type)
    }

    /// Attempts to move the item to a new status.
    ///
    /// On success returns the item's next state: status set, one history
    /// entry appended, `last_status_change` updated, the coarse fulfillment
    /// status re-projected, and the revision bumped. On failure returns
    /// [`FulfillmentError::InvalidTransition`] and nothing changes.
    pub fn transition(
        &self,
        to: ItemStatus,
        actor: impl Into<String>,
        reason: Option<String>,
        metadata: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<LineItem, FulfillmentError> {
        let policy = self.policy();
        if !policy.allows(self.status, to) {
            return Err(FulfillmentError::InvalidTransition {
                item_type: self.item_type,
                from: self.status,
                to,
            });
        }

        let mut next = self.clone();
        next.status_history.push(StatusChange {
            from: self.status,
            to,
            changed_at: now,
            actor: actor.into(),
            reason,
            metadata,
        });
        next.status = to;
        next.fulfillment_status = policy.projection(to);
        next.last_status_change = Some(now);
        next.revision = self.revision.next();
        Ok(next)
    }

    /// Attaches type-specific fulfillment data, rejecting payloads that
    /// belong to a different item type.
    pub fn attach_fulfillment_data(
        &mut self,
        data: FulfillmentData,
    ) -> Result<(), FulfillmentError> {
        if data.applies_to() != self.item_type {
            return Err(FulfillmentError::FulfillmentDataMismatch {
                kind: data.kind(),
                item_type: self.item_type,
            });
        }
        self.fulfillment_data = Some(data);
        Ok(())
    }

    /// Returns true when the item may still be cancelled.
    pub fn is_cancellable(&self) -> bool {
        self.policy().is_cancellable(self.status)
    }

    /// Returns true when a refund may be requested for the item.
    pub fn is_refundable(&self) -> bool {
        self.policy().is_refundable(self.status)
    }

    /// Returns true when the item reached one of its type's successful end
    /// states.
    pub fn is_success(&self) -> bool {
        self.policy().is_success(self.status)
    }

    /// Returns true when no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        self.policy().is_terminal(self.status)
    }
}
