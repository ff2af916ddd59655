//! Dead letter queue admin endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use common::DlqEntryId;
use dispatcher::DlqHandler;
use outbox::{DlqEntry, LifecycleStore};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S: LifecycleStore> {
    pub dlq: DlqHandler<S>,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    /// Also return entries that were already requeued.
    #[serde(default)]
    pub include_reprocessed: bool,
}

#[derive(Serialize)]
pub struct DlqEntryResponse {
    pub id: String,
    pub original_event_id: String,
    pub aggregate_id: String,
    pub aggregate_type: String,
    pub event_type: String,
    pub idempotency_key: String,
    pub error_message: String,
    pub retry_count: i32,
    pub first_failed_at: String,
    pub moved_to_dlq_at: String,
    pub reprocessed: bool,
    pub reprocessed_at: Option<String>,
}

impl From<DlqEntry> for DlqEntryResponse {
    fn from(entry: DlqEntry) -> Self {
        Self {
            id: entry.id.to_string(),
            original_event_id: entry.original_event_id.to_string(),
            aggregate_id: entry.aggregate_id.to_string(),
            aggregate_type: entry.aggregate_kind.to_string(),
            event_type: entry.event_type,
            idempotency_key: entry.idempotency_key,
            error_message: entry.error_message,
            retry_count: entry.retry_count,
            first_failed_at: entry.first_failed_at.to_rfc3339(),
            moved_to_dlq_at: entry.moved_to_dlq_at.to_rfc3339(),
            reprocessed: entry.reprocessed,
            reprocessed_at: entry.reprocessed_at.map(|at| at.to_rfc3339()),
        }
    }
}

#[derive(Serialize)]
pub struct ReprocessResponse {
    pub dlq_entry_id: String,
    pub event_id: String,
    pub event_type: String,
    pub idempotency_key: String,
}

/// GET /dlq — list dead letter entries, newest first.
#[tracing::instrument(skip(state))]
pub async fn list<S: LifecycleStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<DlqEntryResponse>>, ApiError> {
    let entries = state.dlq.entries(params.include_reprocessed).await?;
    Ok(Json(
        entries.into_iter().map(DlqEntryResponse::from).collect(),
    ))
}

/// POST /dlq/:id/reprocess — put a fresh copy of the entry's event back on
/// the outbox.
#[tracing::instrument(skip(state))]
pub async fn reprocess<S: LifecycleStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<ReprocessResponse>, ApiError> {
    let entry_id = parse_entry_id(&id)?;
    let event = state.dlq.reprocess(entry_id).await?;

    Ok(Json(ReprocessResponse {
        dlq_entry_id: entry_id.to_string(),
        event_id: event.id.to_string(),
        event_type: event.event_type,
        idempotency_key: event.idempotency_key,
    }))
}

fn parse_entry_id(id: &str) -> Result<DlqEntryId, ApiError> {
    let uuid = uuid::Uuid::parse_str(id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid DLQ entry ID: {e}")))?;
    Ok(DlqEntryId::from_uuid(uuid))
}
