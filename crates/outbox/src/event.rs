use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use common::EventId;

use crate::error::StoreError;

/// The kind of aggregate an outbox event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateKind {
    Order,
    OrderLineItem,
}

impl AggregateKind {
    /// Returns the kind name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateKind::Order => "order",
            AggregateKind::OrderLineItem => "order_line_item",
        }
    }
}

impl std::fmt::Display for AggregateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AggregateKind {
    type Err = StoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "order" => Ok(AggregateKind::Order),
            "order_line_item" => Ok(AggregateKind::OrderLineItem),
            other => Err(StoreError::Decode(format!("unknown aggregate kind: {other}"))),
        }
    }
}

/// Delivery state of an outbox row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// Waiting to be claimed by a dispatch worker.
    #[default]
    Pending,

    /// Claimed by a worker; publish in flight.
    Processing,

    /// Successfully delivered.
    Processed,

    /// Delivery failed; waiting for its retry slot.
    Failed,
}

impl EventStatus {
    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Pending => "pending",
            EventStatus::Processing => "processing",
            EventStatus::Processed => "processed",
            EventStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EventStatus {
    type Err = StoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(EventStatus::Pending),
            "processing" => Ok(EventStatus::Processing),
            "processed" => Ok(EventStatus::Processed),
            "failed" => Ok(EventStatus::Failed),
            other => Err(StoreError::Decode(format!("unknown event status: {other}"))),
        }
    }
}

/// One row of the transactional outbox.
///
/// Rows are written in the same transaction as the state change that caused
/// them and picked up later by dispatch workers. Delivery is at-least-once;
/// `idempotency_key` is unique per logical mutation so consumers can
/// deduplicate replays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEvent {
    pub id: EventId,
    pub aggregate_id: Uuid,
    pub aggregate_kind: AggregateKind,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub status: EventStatus,
    pub retry_count: i32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub idempotency_key: String,
    pub error_message: Option<String>,
    /// When the first delivery failure happened, carried into the DLQ.
    pub first_failed_at: Option<DateTime<Utc>>,
    /// When the current `Processing` claim was taken; cleared on settle.
    pub claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl OutboxEvent {
    /// Creates a fresh pending row.
    pub fn new(
        aggregate_id: Uuid,
        aggregate_kind: AggregateKind,
        event_type: impl Into<String>,
        payload: serde_json::Value,
        idempotency_key: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EventId::new(),
            aggregate_id,
            aggregate_kind,
            event_type: event_type.into(),
            payload,
            status: EventStatus::Pending,
            retry_count: 0,
            next_retry_at: None,
            idempotency_key: idempotency_key.into(),
            error_message: None,
            first_failed_at: None,
            claimed_at: None,
            created_at: now,
            processed_at: None,
        }
    }

    /// Returns true when the row is dispatchable at `now`: pending, or
    /// failed with its retry slot reached.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            EventStatus::Pending => true,
            EventStatus::Failed => self
                .next_retry_at
                .map(|at| at <= now)
                .unwrap_or(true),
            EventStatus::Processing | EventStatus::Processed => false,
        }
    }
}
