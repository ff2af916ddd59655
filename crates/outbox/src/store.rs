use async_trait::async_trait;
use chrono::{DateTime, Utc};

use common::{DlqEntryId, EventId, LineItemId, OrderId, Revision};
use domain::{LineItem, Order, OrderStatus, PaymentStatus};

use crate::dlq::DlqEntry;
use crate::event::OutboxEvent;
use crate::transition::{StatusTransition, TransitionSubject};
use crate::{Result, StoreError};

/// The order-row update carried by every transition commit.
///
/// The order row is written (and revision-checked) on every commit, even
/// when the derived status did not change: it is the serialization point
/// for concurrent transitions of sibling items, and `payment_status` may
/// move without the order status moving.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderStatusUpdate {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub expected_revision: Revision,
    pub updated_at: DateTime<Utc>,
}

/// Everything one line item transition writes, applied in a single
/// transaction: the item's next state, the order-row update, the audit
/// rows, and the outbox rows. If any part fails, none of it is visible.
#[derive(Debug, Clone)]
pub struct TransitionCommit {
    /// The item's next state; its revision must already be bumped.
    pub item: LineItem,

    /// The revision the caller read the item at.
    pub expected_item_revision: Revision,

    /// The order-row update.
    pub order: OrderStatusUpdate,

    /// Audit rows: the item transition, plus the order transition when the
    /// derived order status changed.
    pub transitions: Vec<StatusTransition>,

    /// Outbox rows to enqueue with the mutation.
    pub events: Vec<OutboxEvent>,
}

/// Validates a commit's internal consistency before it touches storage.
pub fn validate_commit(commit: &TransitionCommit) -> Result<()> {
    if commit.item.revision != commit.expected_item_revision.next() {
        return Err(StoreError::InvalidCommit(format!(
            "item revision {} does not follow expected revision {}",
            commit.item.revision, commit.expected_item_revision
        )));
    }

    if commit.item.order_id != commit.order.order_id {
        return Err(StoreError::InvalidCommit(
            "item does not belong to the order being updated".to_string(),
        ));
    }

    if commit.transitions.is_empty() {
        return Err(StoreError::InvalidCommit(
            "a transition commit must record at least the item transition".to_string(),
        ));
    }

    for transition in &commit.transitions {
        let belongs = match transition.subject {
            TransitionSubject::Order(order_id) => order_id == commit.order.order_id,
            TransitionSubject::LineItem(item_id) => item_id == commit.item.id,
        };
        if !belongs {
            return Err(StoreError::InvalidCommit(
                "transition row references a foreign subject".to_string(),
            ));
        }
    }

    for event in &commit.events {
        let item_uuid = commit.item.id.as_uuid();
        let order_uuid = commit.order.order_id.as_uuid();
        if event.aggregate_id != item_uuid && event.aggregate_id != order_uuid {
            return Err(StoreError::InvalidCommit(
                "outbox event references a foreign aggregate".to_string(),
            ));
        }
    }

    Ok(())
}

/// Core persistence trait for the lifecycle engine.
///
/// Implementations must apply each mutating method atomically: a failed
/// commit leaves no partial rows behind, and dispatch workers coordinate
/// exclusively through the row statuses this trait exposes.
#[async_trait]
pub trait LifecycleStore: Send + Sync {
    /// Persists a new order, its items, and its placement outbox rows in
    /// one transaction.
    async fn insert_order(&self, order: &Order, events: Vec<OutboxEvent>) -> Result<()>;

    /// Loads an order with all of its items.
    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Loads the order owning a line item.
    async fn get_order_for_item(&self, line_item_id: LineItemId) -> Result<Option<Order>>;

    /// Loads a single line item.
    async fn get_line_item(&self, line_item_id: LineItemId) -> Result<Option<LineItem>>;

    /// Applies a transition commit in one transaction.
    ///
    /// Both the item row and the order row are updated conditionally on the
    /// revisions the caller read; a mismatch fails the whole commit with
    /// [`StoreError::ConcurrentModification`], and the caller retries from a
    /// fresh read. Outbox rows whose idempotency key already exists are
    /// skipped silently.
    async fn commit_transition(&self, commit: TransitionCommit) -> Result<()>;

    /// Returns the order-level audit trail, oldest first.
    async fn transitions_for_order(&self, order_id: OrderId) -> Result<Vec<StatusTransition>>;

    /// Returns a line item's audit trail, oldest first.
    async fn transitions_for_item(&self, line_item_id: LineItemId)
    -> Result<Vec<StatusTransition>>;

    /// Atomically claims up to `batch_size` dispatchable rows, flipping them
    /// to `Processing` in the same statement.
    ///
    /// Only the oldest non-processed row of each aggregate is eligible, and
    /// an aggregate with a row already in flight is skipped entirely, so
    /// per-aggregate delivery order is preserved. A row is never claimed by
    /// two workers.
    async fn claim_due_events(
        &self,
        batch_size: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<OutboxEvent>>;

    /// Settles a claimed row as delivered.
    async fn mark_processed(&self, event_id: EventId, now: DateTime<Utc>) -> Result<()>;

    /// Settles a claimed row as failed: bumps the retry count, records the
    /// error, keeps the first failure time, and schedules the next attempt.
    async fn mark_failed(
        &self,
        event_id: EventId,
        error_message: &str,
        next_retry_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<()>;

    /// Returns rows stuck in `Processing` since before `stale_before` to
    /// `Pending`. Returns how many rows were released.
    async fn release_stuck(&self, stale_before: DateTime<Utc>) -> Result<u64>;

    /// Loads a single outbox row.
    async fn get_event(&self, event_id: EventId) -> Result<Option<OutboxEvent>>;

    /// Counts rows currently waiting in `Pending`.
    async fn pending_event_count(&self) -> Result<u64>;

    /// Inserts a DLQ entry and removes the original outbox row in one
    /// transaction.
    async fn move_to_dlq(&self, entry: DlqEntry) -> Result<()>;

    /// Loads a single DLQ entry.
    async fn get_dlq_entry(&self, entry_id: DlqEntryId) -> Result<Option<DlqEntry>>;

    /// Lists DLQ entries, newest first.
    async fn list_dlq_entries(&self, include_reprocessed: bool) -> Result<Vec<DlqEntry>>;

    /// Reprocesses a DLQ entry: inserts exactly one fresh pending outbox
    /// event built from the entry and flips the `reprocessed` flag, in one
    /// transaction. Fails with [`StoreError::AlreadyReprocessed`] when the
    /// flag is already set; concurrent calls settle with exactly one winner.
    async fn reprocess_dlq_entry(
        &self,
        entry_id: DlqEntryId,
        now: DateTime<Utc>,
    ) -> Result<OutboxEvent>;
}
