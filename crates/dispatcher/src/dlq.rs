//! Dead letter queue operations.

use chrono::Utc;
use common::DlqEntryId;
use outbox::{DlqEntry, LifecycleStore, OutboxEvent, Result};

/// Inspection and replay of dead lettered events.
pub struct DlqHandler<S> {
    store: S,
}

impl<S: LifecycleStore> DlqHandler<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Lists entries, newest first. Reprocessed entries stay in the queue as
    /// a record and are included only on request.
    pub async fn entries(&self, include_reprocessed: bool) -> Result<Vec<DlqEntry>> {
        self.store.list_dlq_entries(include_reprocessed).await
    }

    pub async fn entry(&self, id: DlqEntryId) -> Result<Option<DlqEntry>> {
        self.store.get_dlq_entry(id).await
    }

    /// Puts a fresh pending copy of the dead lettered event back on the
    /// outbox, exactly once per entry. A second call fails with
    /// [`outbox::StoreError::AlreadyReprocessed`].
    #[tracing::instrument(skip(self), fields(dlq_entry_id = %id))]
    pub async fn reprocess(&self, id: DlqEntryId) -> Result<OutboxEvent> {
        let event = self.store.reprocess_dlq_entry(id, Utc::now()).await?;
        metrics::counter!("dlq_entries_reprocessed_total").increment(1);
        tracing::info!(
            event_id = %event.id,
            event_type = %event.event_type,
            "dead letter requeued"
        );
        Ok(event)
    }
}
