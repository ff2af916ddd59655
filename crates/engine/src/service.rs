//! The write side of the lifecycle engine.
//!
//! [`FulfillmentService`] turns requests into commits: it loads the order,
//! runs the pure transition on the item, re-derives the order statuses, and
//! hands the store one [`TransitionCommit`] carrying the item, the order
//! update, the audit rows, and the outbox events. Everything lands in a
//! single transaction or not at all.

use chrono::Utc;
use common::{LineItemId, OrderId};
use domain::{LineItem, Order};
use outbox::{
    AggregateKind, LifecycleStore, OrderStatusUpdate, OutboxEvent, StatusTransition,
    TransitionCommit, idempotency_key,
};

use crate::error::{EngineError, Result};
use crate::events::{
    LineItemStatusChangedData, ORDER_PLACED, OrderPlacedData, OrderStatusChangedData,
    PlacedItemData, line_item_event_type, order_event_type,
};
use crate::requests::{PlaceOrder, TransitionRequest};

/// Coordinates order placement and line item transitions over a store.
pub struct FulfillmentService<S: LifecycleStore> {
    store: S,
}

impl<S: LifecycleStore> FulfillmentService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Access to the underlying store, mainly for adjacent components that
    /// share it (dispatcher, DLQ tooling).
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Accepts a new order and enqueues its `OrderPlaced` event.
    ///
    /// An empty item list is allowed; the order simply stays pending until
    /// items exist to drive it.
    #[tracing::instrument(skip(self, request), fields(order_id = %request.order_id))]
    pub async fn place_order(&self, request: PlaceOrder) -> Result<Order> {
        let now = Utc::now();
        let order = Order::with_id(request.order_id, request.item_types, now);

        let payload = serde_json::to_value(OrderPlacedData {
            order_id: order.id,
            status: order.status,
            payment_status: order.payment_status,
            items: order
                .items
                .iter()
                .map(|item| PlacedItemData {
                    line_item_id: item.id,
                    item_type: item.item_type,
                })
                .collect(),
            occurred_at: now,
        })?;
        let event = OutboxEvent::new(
            order.id.as_uuid(),
            AggregateKind::Order,
            ORDER_PLACED,
            payload,
            idempotency_key(order.id.as_uuid(), ORDER_PLACED, order.revision),
            now,
        );

        self.store.insert_order(&order, vec![event]).await?;

        metrics::counter!("orders_placed_total").increment(1);
        tracing::info!(items = order.items.len(), "order placed");
        Ok(order)
    }

    /// Moves one line item to a new status and commits every consequence of
    /// the move atomically.
    ///
    /// The commit is conditional on the revisions read here; a concurrent
    /// writer surfaces as [`outbox::StoreError::ConcurrentModification`] and
    /// the caller retries from a fresh read.
    #[tracing::instrument(
        skip(self, request),
        fields(line_item_id = %request.line_item_id, to = %request.to_status)
    )]
    pub async fn request_transition(&self, request: TransitionRequest) -> Result<Order> {
        let now = Utc::now();

        let order = self
            .store
            .get_order_for_item(request.line_item_id)
            .await?
            .ok_or(EngineError::LineItemNotFound(request.line_item_id))?;
        let current = order
            .item(request.line_item_id)
            .ok_or(EngineError::LineItemNotFound(request.line_item_id))?;

        let mut item = current.transition(
            request.to_status,
            request.actor.clone(),
            request.reason.clone(),
            request.metadata.clone(),
            now,
        )?;
        if let Some(data) = request.fulfillment_data.clone() {
            item.attach_fulfillment_data(data)?;
        }

        let mut next = order.clone();
        next.replace_item(item.clone());
        let order_change = next.recompute(now);

        let mut transitions = vec![StatusTransition::for_item(
            item.id,
            current.status,
            request.to_status,
            request.actor.clone(),
            request.reason.clone(),
            request.metadata.clone(),
            now,
        )];

        let item_event_type = line_item_event_type(request.to_status);
        let item_payload = serde_json::to_value(LineItemStatusChangedData {
            order_id: order.id,
            line_item_id: item.id,
            item_type: item.item_type,
            from: current.status,
            to: request.to_status,
            fulfillment_status: item.fulfillment_status,
            actor: request.actor.clone(),
            reason: request.reason.clone(),
            occurred_at: now,
        })?;
        let mut events = vec![OutboxEvent::new(
            item.id.as_uuid(),
            AggregateKind::OrderLineItem,
            item_event_type.clone(),
            item_payload,
            idempotency_key(item.id.as_uuid(), &item_event_type, item.revision),
            now,
        )];

        if let Some((from, to)) = order_change {
            transitions.push(StatusTransition::for_order(
                order.id,
                from,
                to,
                request.actor.clone(),
                request.reason.clone(),
                serde_json::json!({}),
                now,
            ));

            let order_event_type = order_event_type(to);
            let order_payload = serde_json::to_value(OrderStatusChangedData {
                order_id: order.id,
                from,
                to,
                payment_status: next.payment_status,
                occurred_at: now,
            })?;
            // The store bumps the order row by one on commit, so the event
            // key is minted against that revision, not the one read here.
            events.push(OutboxEvent::new(
                order.id.as_uuid(),
                AggregateKind::Order,
                order_event_type.clone(),
                order_payload,
                idempotency_key(order.id.as_uuid(), &order_event_type, order.revision.next()),
                now,
            ));
        }

        let commit = TransitionCommit {
            item: item.clone(),
            expected_item_revision: current.revision,
            order: OrderStatusUpdate {
                order_id: order.id,
                status: next.status,
                payment_status: next.payment_status,
                expected_revision: order.revision,
                updated_at: now,
            },
            transitions,
            events,
        };

        if let Err(err) = self.store.commit_transition(commit).await {
            let err = EngineError::from(err);
            if err.is_conflict() {
                metrics::counter!("transition_conflicts_total").increment(1);
                tracing::warn!("commit lost a revision race");
            }
            return Err(err);
        }

        metrics::counter!("item_transitions_total", "to_status" => request.to_status.as_str())
            .increment(1);
        tracing::info!(
            order_id = %order.id,
            from = %current.status,
            order_status = %next.status,
            "line item transitioned"
        );

        next.revision = next.revision.next();
        Ok(next)
    }

    /// Loads an order with its items.
    pub async fn get_order(&self, order_id: OrderId) -> Result<Order> {
        self.store
            .get_order(order_id)
            .await?
            .ok_or(EngineError::OrderNotFound(order_id))
    }

    /// Loads a single line item.
    pub async fn get_line_item(&self, line_item_id: LineItemId) -> Result<LineItem> {
        self.store
            .get_line_item(line_item_id)
            .await?
            .ok_or(EngineError::LineItemNotFound(line_item_id))
    }

    /// The item's transition log, oldest first.
    pub async fn item_history(&self, line_item_id: LineItemId) -> Result<Vec<StatusTransition>> {
        Ok(self.store.transitions_for_item(line_item_id).await?)
    }

    /// The order's own transition log (order-level rows only), oldest first.
    pub async fn order_history(&self, order_id: OrderId) -> Result<Vec<StatusTransition>> {
        Ok(self.store.transitions_for_order(order_id).await?)
    }
}
