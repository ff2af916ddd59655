//! Webhook publisher: delivers events as JSON over HTTP POST.

use async_trait::async_trait;
use outbox::OutboxEvent;

use crate::publisher::{EventPublisher, PublishError};

/// Publishes each event to a fixed HTTP endpoint.
///
/// The request body is a flat envelope around the event payload; consumers
/// deduplicate on `idempotency_key`. Any 2xx answer counts as delivered,
/// anything else is a rejection and follows the retry path.
#[derive(Debug, Clone)]
pub struct WebhookPublisher {
    client: reqwest::Client,
    endpoint: String,
}

impl WebhookPublisher {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl EventPublisher for WebhookPublisher {
    async fn publish(&self, event: &OutboxEvent) -> Result<(), PublishError> {
        let envelope = serde_json::json!({
            "id": event.id,
            "aggregate_id": event.aggregate_id,
            "aggregate_type": event.aggregate_kind.as_str(),
            "event_type": event.event_type,
            "idempotency_key": event.idempotency_key,
            "payload": event.payload,
            "created_at": event.created_at,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .json(&envelope)
            .send()
            .await
            .map_err(|err| PublishError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PublishError::Rejected(format!(
                "endpoint answered {status}"
            )));
        }
        Ok(())
    }
}
