use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use common::{DlqEntryId, EventId, LineItemId, OrderId};
use domain::{LineItem, Order};

use crate::dlq::DlqEntry;
use crate::event::{EventStatus, OutboxEvent};
use crate::store::{LifecycleStore, TransitionCommit, validate_commit};
use crate::transition::{StatusTransition, TransitionSubject};
use crate::{Result, StoreError};

#[derive(Default)]
struct MemoryState {
    orders: HashMap<OrderId, Order>,
    events: Vec<OutboxEvent>,
    transitions: Vec<StatusTransition>,
    dlq: Vec<DlqEntry>,
}

/// In-memory lifecycle store for testing.
///
/// Stores everything behind a single lock and provides the same interface
/// and failure semantics as the PostgreSQL implementation, including
/// revision conflicts, idempotent enqueueing, and claim exclusivity.
#[derive(Clone, Default)]
pub struct InMemoryLifecycleStore {
    state: Arc<RwLock<MemoryState>>,
    fail_next_commit: Arc<AtomicBool>,
}

impl InMemoryLifecycleStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of outbox rows, settled or not.
    pub async fn event_count(&self) -> usize {
        self.state.read().await.events.len()
    }

    /// Clears all stored data.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.orders.clear();
        state.events.clear();
        state.transitions.clear();
        state.dlq.clear();
    }

    /// Makes the next `commit_transition` call fail with a revision
    /// conflict, as if another writer got there first.
    pub fn inject_commit_conflict(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }
}

/// Appends `event` unless a row with the same idempotency key exists.
fn enqueue_if_new(events: &mut Vec<OutboxEvent>, event: OutboxEvent) {
    let duplicate = events
        .iter()
        .any(|existing| existing.idempotency_key == event.idempotency_key);
    if !duplicate {
        events.push(event);
    }
}

#[async_trait]
impl LifecycleStore for InMemoryLifecycleStore {
    async fn insert_order(&self, order: &Order, events: Vec<OutboxEvent>) -> Result<()> {
        let mut state = self.state.write().await;
        state.orders.insert(order.id, order.clone());
        for event in events {
            enqueue_if_new(&mut state.events, event);
        }
        Ok(())
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let state = self.state.read().await;
        Ok(state.orders.get(&order_id).cloned())
    }

    async fn get_order_for_item(&self, line_item_id: LineItemId) -> Result<Option<Order>> {
        let state = self.state.read().await;
        let order = state
            .orders
            .values()
            .find(|order| order.items.iter().any(|item| item.id == line_item_id))
            .cloned();
        Ok(order)
    }

    async fn get_line_item(&self, line_item_id: LineItemId) -> Result<Option<LineItem>> {
        let state = self.state.read().await;
        let item = state
            .orders
            .values()
            .flat_map(|order| order.items.iter())
            .find(|item| item.id == line_item_id)
            .cloned();
        Ok(item)
    }

    async fn commit_transition(&self, commit: TransitionCommit) -> Result<()> {
        validate_commit(&commit)?;

        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(StoreError::ConcurrentModification {
                entity: "line_item",
                id: commit.item.id.as_uuid(),
                expected: commit.expected_item_revision,
                actual: commit.expected_item_revision.next(),
            });
        }

        let mut state = self.state.write().await;

        let order = state
            .orders
            .get_mut(&commit.order.order_id)
            .ok_or(StoreError::OrderNotFound(commit.order.order_id))?;

        let stored_item = order
            .item(commit.item.id)
            .ok_or(StoreError::LineItemNotFound(commit.item.id))?;
        if stored_item.revision != commit.expected_item_revision {
            return Err(StoreError::ConcurrentModification {
                entity: "line_item",
                id: commit.item.id.as_uuid(),
                expected: commit.expected_item_revision,
                actual: stored_item.revision,
            });
        }

        if order.revision != commit.order.expected_revision {
            return Err(StoreError::ConcurrentModification {
                entity: "order",
                id: commit.order.order_id.as_uuid(),
                expected: commit.order.expected_revision,
                actual: order.revision,
            });
        }

        order.replace_item(commit.item);
        order.status = commit.order.status;
        order.payment_status = commit.order.payment_status;
        order.updated_at = commit.order.updated_at;
        order.revision = order.revision.next();

        state.transitions.extend(commit.transitions);
        for event in commit.events {
            enqueue_if_new(&mut state.events, event);
        }

        Ok(())
    }

    async fn transitions_for_order(&self, order_id: OrderId) -> Result<Vec<StatusTransition>> {
        let state = self.state.read().await;
        let rows = state
            .transitions
            .iter()
            .filter(|row| row.subject == TransitionSubject::Order(order_id))
            .cloned()
            .collect();
        Ok(rows)
    }

    async fn transitions_for_item(
        &self,
        line_item_id: LineItemId,
    ) -> Result<Vec<StatusTransition>> {
        let state = self.state.read().await;
        let rows = state
            .transitions
            .iter()
            .filter(|row| row.subject == TransitionSubject::LineItem(line_item_id))
            .cloned()
            .collect();
        Ok(rows)
    }

    async fn claim_due_events(
        &self,
        batch_size: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<OutboxEvent>> {
        let mut state = self.state.write().await;

        // Indices of unsettled rows in delivery order.
        let mut unsettled: Vec<usize> = state
            .events
            .iter()
            .enumerate()
            .filter(|(_, event)| event.status != EventStatus::Processed)
            .map(|(index, _)| index)
            .collect();
        unsettled.sort_by_key(|&index| (state.events[index].created_at, index));

        // Only the head row of each aggregate is eligible, and only when it
        // is due. A head that is in flight or waiting out its backoff blocks
        // the whole aggregate.
        let mut seen = HashSet::new();
        let mut claimed_indices = Vec::new();
        for index in unsettled {
            let event = &state.events[index];
            if !seen.insert(event.aggregate_id) {
                continue;
            }
            if event.is_due(now) {
                claimed_indices.push(index);
                if claimed_indices.len() == batch_size {
                    break;
                }
            }
        }

        let mut claimed = Vec::with_capacity(claimed_indices.len());
        for index in claimed_indices {
            let event = &mut state.events[index];
            event.status = EventStatus::Processing;
            event.claimed_at = Some(now);
            claimed.push(event.clone());
        }
        Ok(claimed)
    }

    async fn mark_processed(&self, event_id: EventId, now: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.write().await;
        let event = state
            .events
            .iter_mut()
            .find(|event| event.id == event_id)
            .ok_or(StoreError::EventNotFound(event_id))?;
        event.status = EventStatus::Processed;
        event.processed_at = Some(now);
        event.claimed_at = None;
        Ok(())
    }

    async fn mark_failed(
        &self,
        event_id: EventId,
        error_message: &str,
        next_retry_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let event = state
            .events
            .iter_mut()
            .find(|event| event.id == event_id)
            .ok_or(StoreError::EventNotFound(event_id))?;
        event.status = EventStatus::Failed;
        event.retry_count += 1;
        event.error_message = Some(error_message.to_string());
        event.first_failed_at.get_or_insert(now);
        event.next_retry_at = next_retry_at;
        event.claimed_at = None;
        Ok(())
    }

    async fn release_stuck(&self, stale_before: DateTime<Utc>) -> Result<u64> {
        let mut state = self.state.write().await;
        let mut released = 0u64;
        for event in &mut state.events {
            let stuck = event.status == EventStatus::Processing
                && event.claimed_at.is_some_and(|claimed| claimed < stale_before);
            if stuck {
                event.status = EventStatus::Pending;
                event.claimed_at = None;
                released += 1;
            }
        }
        Ok(released)
    }

    async fn get_event(&self, event_id: EventId) -> Result<Option<OutboxEvent>> {
        let state = self.state.read().await;
        Ok(state.events.iter().find(|event| event.id == event_id).cloned())
    }

    async fn pending_event_count(&self) -> Result<u64> {
        let state = self.state.read().await;
        let count = state
            .events
            .iter()
            .filter(|event| event.status == EventStatus::Pending)
            .count();
        Ok(count as u64)
    }

    async fn move_to_dlq(&self, entry: DlqEntry) -> Result<()> {
        let mut state = self.state.write().await;
        let position = state
            .events
            .iter()
            .position(|event| event.id == entry.original_event_id)
            .ok_or(StoreError::EventNotFound(entry.original_event_id))?;
        state.events.remove(position);
        state.dlq.push(entry);
        Ok(())
    }

    async fn get_dlq_entry(&self, entry_id: DlqEntryId) -> Result<Option<DlqEntry>> {
        let state = self.state.read().await;
        Ok(state.dlq.iter().find(|entry| entry.id == entry_id).cloned())
    }

    async fn list_dlq_entries(&self, include_reprocessed: bool) -> Result<Vec<DlqEntry>> {
        let state = self.state.read().await;
        let mut entries: Vec<_> = state
            .dlq
            .iter()
            .filter(|entry| include_reprocessed || !entry.reprocessed)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.moved_to_dlq_at.cmp(&a.moved_to_dlq_at));
        Ok(entries)
    }

    async fn reprocess_dlq_entry(
        &self,
        entry_id: DlqEntryId,
        now: DateTime<Utc>,
    ) -> Result<OutboxEvent> {
        let mut state = self.state.write().await;
        let position = state
            .dlq
            .iter()
            .position(|entry| entry.id == entry_id)
            .ok_or(StoreError::DlqEntryNotFound(entry_id))?;
        if state.dlq[position].reprocessed {
            return Err(StoreError::AlreadyReprocessed(entry_id));
        }

        let replacement = state.dlq[position].replacement_event(now);
        state.dlq[position].reprocessed = true;
        state.dlq[position].reprocessed_at = Some(now);
        state.events.push(replacement.clone());
        Ok(replacement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::AggregateKind;
    use crate::idempotency::idempotency_key;
    use crate::store::OrderStatusUpdate;
    use chrono::Duration;
    use domain::{ItemStatus, ItemType};
    use serde_json::json;
    use uuid::Uuid;

    fn bare_event(aggregate_id: Uuid, key: &str, now: DateTime<Utc>) -> OutboxEvent {
        OutboxEvent::new(
            aggregate_id,
            AggregateKind::OrderLineItem,
            "LineItemShipped",
            json!({"n": key}),
            key,
            now,
        )
    }

    /// Builds the full commit for moving the order's first item to `to`.
    fn commit_first_item(order: &Order, to: ItemStatus, now: DateTime<Utc>) -> TransitionCommit {
        let current = &order.items[0];
        let item = current
            .transition(to, "tester", None, json!({}), now)
            .unwrap();

        let mut preview = order.clone();
        preview.replace_item(item.clone());
        let order_change = preview.recompute(now);

        let mut transitions = vec![StatusTransition::for_item(
            item.id,
            current.status,
            to,
            "tester",
            None,
            json!({}),
            now,
        )];
        if let Some((from, to_status)) = order_change {
            transitions.push(StatusTransition::for_order(
                order.id, from, to_status, "tester", None, json!({}), now,
            ));
        }

        let event_type = format!("LineItem{}", to.event_fragment());
        let key = idempotency_key(item.id.as_uuid(), &event_type, item.revision);
        let events = vec![OutboxEvent::new(
            item.id.as_uuid(),
            AggregateKind::OrderLineItem,
            event_type,
            json!({}),
            key,
            now,
        )];

        TransitionCommit {
            expected_item_revision: current.revision,
            order: OrderStatusUpdate {
                order_id: order.id,
                status: preview.status,
                payment_status: preview.payment_status,
                expected_revision: order.revision,
                updated_at: now,
            },
            item,
            transitions,
            events,
        }
    }

    #[tokio::test]
    async fn insert_and_load_order() {
        let store = InMemoryLifecycleStore::new();
        let now = Utc::now();
        let order = Order::new(vec![ItemType::Physical, ItemType::Digital], now);
        let event = bare_event(order.id.as_uuid(), "placed:r1", now);

        store.insert_order(&order, vec![event]).await.unwrap();

        let loaded = store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(loaded.items.len(), 2);
        assert_eq!(store.pending_event_count().await.unwrap(), 1);

        let via_item = store
            .get_order_for_item(order.items[1].id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(via_item.id, order.id);

        let item = store
            .get_line_item(order.items[0].id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(item.status, ItemStatus::Pending);
    }

    #[tokio::test]
    async fn commit_applies_item_order_and_audit_rows() {
        let store = InMemoryLifecycleStore::new();
        let now = Utc::now();
        let order = Order::new(vec![ItemType::Physical], now);
        store.insert_order(&order, vec![]).await.unwrap();

        let commit = commit_first_item(&order, ItemStatus::PaymentConfirmed, now);
        store.commit_transition(commit).await.unwrap();

        let loaded = store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(loaded.items[0].status, ItemStatus::PaymentConfirmed);
        assert_eq!(loaded.items[0].revision, order.items[0].revision.next());
        assert_eq!(loaded.revision, order.revision.next());

        let item_trail = store
            .transitions_for_item(order.items[0].id)
            .await
            .unwrap();
        assert_eq!(item_trail.len(), 1);
        assert_eq!(item_trail[0].to_status, "payment_confirmed");

        // Pending -> PaymentConfirmed moves the derived order status too.
        let order_trail = store.transitions_for_order(order.id).await.unwrap();
        assert_eq!(order_trail.len(), 1);

        assert_eq!(store.pending_event_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn stale_item_revision_is_rejected() {
        let store = InMemoryLifecycleStore::new();
        let now = Utc::now();
        let order = Order::new(vec![ItemType::Physical], now);
        store.insert_order(&order, vec![]).await.unwrap();

        let first = commit_first_item(&order, ItemStatus::PaymentConfirmed, now);
        let second = commit_first_item(&order, ItemStatus::Cancelled, now);
        store.commit_transition(first).await.unwrap();

        // Second writer still holds the original read.
        let result = store.commit_transition(second).await;
        assert!(matches!(
            result,
            Err(StoreError::ConcurrentModification {
                entity: "line_item",
                ..
            })
        ));

        // Nothing from the losing commit landed.
        let loaded = store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(loaded.items[0].status, ItemStatus::PaymentConfirmed);
        assert_eq!(
            store
                .transitions_for_item(order.items[0].id)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn injected_conflict_fails_once_then_retry_succeeds() {
        let store = InMemoryLifecycleStore::new();
        let now = Utc::now();
        let order = Order::new(vec![ItemType::Physical], now);
        store.insert_order(&order, vec![]).await.unwrap();

        store.inject_commit_conflict();
        let commit = commit_first_item(&order, ItemStatus::PaymentConfirmed, now);
        let result = store.commit_transition(commit.clone()).await;
        assert!(matches!(
            result,
            Err(StoreError::ConcurrentModification { .. })
        ));

        store.commit_transition(commit).await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_idempotency_key_is_skipped() {
        let store = InMemoryLifecycleStore::new();
        let now = Utc::now();
        let aggregate = Uuid::new_v4();

        store
            .insert_order(
                &Order::new(vec![ItemType::Physical], now),
                vec![
                    bare_event(aggregate, "same-key", now),
                    bare_event(aggregate, "same-key", now),
                ],
            )
            .await
            .unwrap();

        assert_eq!(store.event_count().await, 1);
    }

    #[tokio::test]
    async fn claim_takes_only_aggregate_heads() {
        let store = InMemoryLifecycleStore::new();
        let t0 = Utc::now();
        let t1 = t0 + Duration::seconds(1);
        let aggregate = Uuid::new_v4();
        let order = Order::new(vec![ItemType::Physical], t0);
        store
            .insert_order(
                &order,
                vec![
                    bare_event(aggregate, "a:1", t0),
                    bare_event(aggregate, "a:2", t1),
                ],
            )
            .await
            .unwrap();

        let claimed = store.claim_due_events(10, t1).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].idempotency_key, "a:1");

        // The head is in flight, so the aggregate stays blocked.
        assert!(store.claim_due_events(10, t1).await.unwrap().is_empty());

        store.mark_processed(claimed[0].id, t1).await.unwrap();
        let next = store.claim_due_events(10, t1).await.unwrap();
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].idempotency_key, "a:2");
    }

    #[tokio::test]
    async fn claim_orders_aggregates_by_age_and_honors_batch_size() {
        let store = InMemoryLifecycleStore::new();
        let t0 = Utc::now();
        let order = Order::new(vec![ItemType::Physical], t0);
        let events = vec![
            bare_event(Uuid::new_v4(), "young", t0 + Duration::seconds(2)),
            bare_event(Uuid::new_v4(), "oldest", t0),
            bare_event(Uuid::new_v4(), "old", t0 + Duration::seconds(1)),
        ];
        store.insert_order(&order, events).await.unwrap();

        let claimed = store
            .claim_due_events(2, t0 + Duration::seconds(5))
            .await
            .unwrap();
        assert_eq!(claimed.len(), 2);
        assert_eq!(claimed[0].idempotency_key, "oldest");
        assert_eq!(claimed[1].idempotency_key, "old");
    }

    #[tokio::test]
    async fn failed_head_blocks_aggregate_until_retry_is_due() {
        let store = InMemoryLifecycleStore::new();
        let t0 = Utc::now();
        let aggregate = Uuid::new_v4();
        let order = Order::new(vec![ItemType::Physical], t0);
        store
            .insert_order(
                &order,
                vec![
                    bare_event(aggregate, "head", t0),
                    bare_event(aggregate, "tail", t0 + Duration::seconds(1)),
                ],
            )
            .await
            .unwrap();

        let claimed = store.claim_due_events(10, t0).await.unwrap();
        let retry_at = t0 + Duration::seconds(30);
        store
            .mark_failed(claimed[0].id, "connection refused", Some(retry_at), t0)
            .await
            .unwrap();

        // Not due yet: neither the failed head nor the row behind it moves.
        assert!(
            store
                .claim_due_events(10, t0 + Duration::seconds(10))
                .await
                .unwrap()
                .is_empty()
        );

        let reclaimed = store.claim_due_events(10, retry_at).await.unwrap();
        assert_eq!(reclaimed.len(), 1);
        assert_eq!(reclaimed[0].idempotency_key, "head");
        assert_eq!(reclaimed[0].retry_count, 1);
        assert_eq!(reclaimed[0].error_message.as_deref(), Some("connection refused"));
    }

    #[tokio::test]
    async fn mark_failed_keeps_first_failure_time() {
        let store = InMemoryLifecycleStore::new();
        let t0 = Utc::now();
        let event = bare_event(Uuid::new_v4(), "k", t0);
        let event_id = event.id;
        let order = Order::new(vec![ItemType::Physical], t0);
        store.insert_order(&order, vec![event]).await.unwrap();

        store
            .mark_failed(event_id, "first", Some(t0), t0)
            .await
            .unwrap();
        let later = t0 + Duration::seconds(60);
        store
            .mark_failed(event_id, "second", Some(later), later)
            .await
            .unwrap();

        let stored = store.get_event(event_id).await.unwrap().unwrap();
        assert_eq!(stored.retry_count, 2);
        assert_eq!(stored.first_failed_at, Some(t0));
        assert_eq!(stored.error_message.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn release_stuck_returns_rows_to_pending() {
        let store = InMemoryLifecycleStore::new();
        let t0 = Utc::now();
        let order = Order::new(vec![ItemType::Physical], t0);
        store
            .insert_order(&order, vec![bare_event(Uuid::new_v4(), "k", t0)])
            .await
            .unwrap();

        let claimed = store.claim_due_events(10, t0).await.unwrap();
        assert_eq!(claimed.len(), 1);

        // Claimed just now: not stale yet.
        assert_eq!(store.release_stuck(t0).await.unwrap(), 0);

        let released = store
            .release_stuck(t0 + Duration::minutes(10))
            .await
            .unwrap();
        assert_eq!(released, 1);

        let reclaimed = store
            .claim_due_events(10, t0 + Duration::minutes(10))
            .await
            .unwrap();
        assert_eq!(reclaimed.len(), 1);
    }

    #[tokio::test]
    async fn move_to_dlq_swaps_the_original_row_for_an_entry() {
        let store = InMemoryLifecycleStore::new();
        let t0 = Utc::now();
        let order = Order::new(vec![ItemType::Physical], t0);
        let mut event = bare_event(Uuid::new_v4(), "k", t0);
        event.retry_count = 6;
        event.error_message = Some("still down".to_string());
        event.first_failed_at = Some(t0);
        let original_id = event.id;
        store
            .insert_order(&order, vec![event.clone()])
            .await
            .unwrap();

        let entry = DlqEntry::from_event(&event, t0 + Duration::minutes(5));
        store.move_to_dlq(entry.clone()).await.unwrap();

        assert!(store.get_event(original_id).await.unwrap().is_none());
        assert_eq!(store.pending_event_count().await.unwrap(), 0);

        let listed = store.list_dlq_entries(false).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].original_event_id, original_id);

        // Second attempt finds no original row left.
        let result = store.move_to_dlq(entry).await;
        assert!(matches!(result, Err(StoreError::EventNotFound(_))));
    }

    #[tokio::test]
    async fn reprocess_enqueues_one_replacement_exactly_once() {
        let store = InMemoryLifecycleStore::new();
        let t0 = Utc::now();
        let order = Order::new(vec![ItemType::Physical], t0);
        let event = bare_event(Uuid::new_v4(), "k", t0);
        store
            .insert_order(&order, vec![event.clone()])
            .await
            .unwrap();

        let entry = DlqEntry::from_event(&event, t0);
        store.move_to_dlq(entry.clone()).await.unwrap();

        let later = t0 + Duration::hours(1);
        let replacement = store.reprocess_dlq_entry(entry.id, later).await.unwrap();
        assert_ne!(replacement.id, event.id);
        assert_eq!(replacement.idempotency_key, event.idempotency_key);
        assert_eq!(replacement.status, EventStatus::Pending);
        assert_eq!(replacement.retry_count, 0);
        assert_eq!(store.pending_event_count().await.unwrap(), 1);

        let result = store.reprocess_dlq_entry(entry.id, later).await;
        assert!(matches!(result, Err(StoreError::AlreadyReprocessed(id)) if id == entry.id));

        // Reprocessed entries drop out of the default listing.
        assert!(store.list_dlq_entries(false).await.unwrap().is_empty());
        let all = store.list_dlq_entries(true).await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(all[0].reprocessed);
        assert_eq!(all[0].reprocessed_at, Some(later));
    }

    #[tokio::test]
    async fn reprocess_unknown_entry_errors() {
        let store = InMemoryLifecycleStore::new();
        let result = store
            .reprocess_dlq_entry(DlqEntryId::new(), Utc::now())
            .await;
        assert!(matches!(result, Err(StoreError::DlqEntryNotFound(_))));
    }
}
