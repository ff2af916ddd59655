//! Publisher trait and in-memory implementation.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use common::EventId;
use outbox::OutboxEvent;
use thiserror::Error;
use uuid::Uuid;

/// Why a publish attempt did not go through.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The consumer did not answer within the configured timeout.
    #[error("Publish timed out after {0:?}")]
    Timeout(Duration),

    /// The consumer could not be reached.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The consumer answered and refused the event.
    #[error("Consumer rejected the event: {0}")]
    Rejected(String),
}

/// Trait for delivering outbox events to a downstream consumer.
///
/// Implementations must be safe to call with the same event more than once;
/// the dispatcher guarantees at-least-once delivery, not exactly-once.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &OutboxEvent) -> Result<(), PublishError>;
}

/// What the in-memory publisher remembers about a delivered event.
#[derive(Debug, Clone)]
pub struct PublishedEvent {
    pub event_id: EventId,
    pub aggregate_id: Uuid,
    pub event_type: String,
    pub idempotency_key: String,
}

#[derive(Debug, Default)]
struct PublisherState {
    published: Vec<PublishedEvent>,
    failures_remaining: u32,
    delay: Option<Duration>,
}

/// In-memory publisher for testing: records deliveries and can be told to
/// fail or stall the next attempts.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPublisher {
    state: Arc<RwLock<PublisherState>>,
}

impl InMemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` publish calls fail with a transport error.
    pub fn fail_times(&self, count: u32) {
        self.state.write().unwrap().failures_remaining = count;
    }

    /// Makes every publish call sleep before answering.
    pub fn set_delay(&self, delay: Duration) {
        self.state.write().unwrap().delay = Some(delay);
    }

    pub fn clear_delay(&self) {
        self.state.write().unwrap().delay = None;
    }

    /// Everything published so far, in delivery order.
    pub fn published(&self) -> Vec<PublishedEvent> {
        self.state.read().unwrap().published.clone()
    }

    pub fn published_count(&self) -> usize {
        self.state.read().unwrap().published.len()
    }

    /// Delivery order for one aggregate, by event type.
    pub fn published_for(&self, aggregate_id: Uuid) -> Vec<String> {
        self.state
            .read()
            .unwrap()
            .published
            .iter()
            .filter(|record| record.aggregate_id == aggregate_id)
            .map(|record| record.event_type.clone())
            .collect()
    }
}

#[async_trait]
impl EventPublisher for InMemoryPublisher {
    async fn publish(&self, event: &OutboxEvent) -> Result<(), PublishError> {
        let (delay, fail) = {
            let mut state = self.state.write().unwrap();
            let fail = if state.failures_remaining > 0 {
                state.failures_remaining -= 1;
                true
            } else {
                false
            };
            (state.delay, fail)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(PublishError::Transport("injected failure".to_string()));
        }

        self.state.write().unwrap().published.push(PublishedEvent {
            event_id: event.id,
            aggregate_id: event.aggregate_id,
            event_type: event.event_type.clone(),
            idempotency_key: event.idempotency_key.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use outbox::AggregateKind;

    fn sample_event() -> OutboxEvent {
        OutboxEvent::new(
            Uuid::new_v4(),
            AggregateKind::Order,
            "OrderPlaced",
            serde_json::json!({}),
            format!("{}:OrderPlaced:r1", Uuid::new_v4()),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn records_published_events_in_order() {
        let publisher = InMemoryPublisher::new();
        let first = sample_event();
        let second = sample_event();

        publisher.publish(&first).await.unwrap();
        publisher.publish(&second).await.unwrap();

        let published = publisher.published();
        assert_eq!(published.len(), 2);
        assert_eq!(published[0].event_id, first.id);
        assert_eq!(published[1].event_id, second.id);
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let publisher = InMemoryPublisher::new();
        publisher.fail_times(1);

        let event = sample_event();
        assert!(matches!(
            publisher.publish(&event).await,
            Err(PublishError::Transport(_))
        ));
        assert_eq!(publisher.published_count(), 0);

        publisher.publish(&event).await.unwrap();
        assert_eq!(publisher.published_count(), 1);
    }
}
