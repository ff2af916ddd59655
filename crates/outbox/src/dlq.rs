use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use common::{DlqEntryId, EventId};

use crate::event::{AggregateKind, EventStatus, OutboxEvent};

/// An outbox event whose retries were exhausted, parked for an operator.
///
/// The entry copies everything needed to republish the event later
/// (including the idempotency key, since the original outbox row is removed
/// in the same transaction that creates the entry), so an event is never
/// both dead-lettered and retryable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DlqEntry {
    pub id: DlqEntryId,
    pub original_event_id: EventId,
    pub aggregate_id: Uuid,
    pub aggregate_kind: AggregateKind,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub idempotency_key: String,
    pub error_message: String,
    pub retry_count: i32,
    /// When the event first failed, preserved from the original row.
    pub first_failed_at: DateTime<Utc>,
    pub moved_to_dlq_at: DateTime<Utc>,
    pub reprocessed: bool,
    pub reprocessed_at: Option<DateTime<Utc>>,
}

impl DlqEntry {
    /// Builds the entry for an exhausted event.
    ///
    /// `first_failed_at` falls back to `now` for the degenerate case of an
    /// event that never recorded a failure before being parked.
    pub fn from_event(event: &OutboxEvent, now: DateTime<Utc>) -> Self {
        Self {
            id: DlqEntryId::new(),
            original_event_id: event.id,
            aggregate_id: event.aggregate_id,
            aggregate_kind: event.aggregate_kind,
            event_type: event.event_type.clone(),
            payload: event.payload.clone(),
            idempotency_key: event.idempotency_key.clone(),
            error_message: event
                .error_message
                .clone()
                .unwrap_or_else(|| "unknown error".to_string()),
            retry_count: event.retry_count,
            first_failed_at: event.first_failed_at.unwrap_or(now),
            moved_to_dlq_at: now,
            reprocessed: false,
            reprocessed_at: None,
        }
    }

    /// Builds the fresh pending outbox event a reprocess creates: new ID,
    /// same idempotency key as the original mutation, retry counters reset.
    pub fn replacement_event(&self, now: DateTime<Utc>) -> OutboxEvent {
        OutboxEvent {
            id: EventId::new(),
            aggregate_id: self.aggregate_id,
            aggregate_kind: self.aggregate_kind,
            event_type: self.event_type.clone(),
            payload: self.payload.clone(),
            status: EventStatus::Pending,
            retry_count: 0,
            next_retry_at: None,
            idempotency_key: self.idempotency_key.clone(),
            error_message: None,
            first_failed_at: None,
            claimed_at: None,
            created_at: now,
            processed_at: None,
        }
    }
}
