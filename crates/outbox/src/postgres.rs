use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use common::{DlqEntryId, EventId, LineItemId, OrderId, Revision};
use domain::{LineItem, Order};

use crate::dlq::DlqEntry;
use crate::event::OutboxEvent;
use crate::store::{LifecycleStore, TransitionCommit, validate_commit};
use crate::transition::{StatusTransition, TransitionSubject};
use crate::{Result, StoreError};

const EVENT_COLUMNS: &str = "id, aggregate_id, aggregate_type, event_type, payload, status, \
     retry_count, next_retry_at, idempotency_key, error_message, first_failed_at, claimed_at, \
     created_at, processed_at";

const DLQ_COLUMNS: &str = "id, original_event_id, aggregate_id, aggregate_type, event_type, \
     payload, idempotency_key, error_message, retry_count, first_failed_at, moved_to_dlq_at, \
     reprocessed, reprocessed_at";

/// PostgreSQL-backed lifecycle store.
#[derive(Clone)]
pub struct PostgresLifecycleStore {
    pool: PgPool,
}

impl PostgresLifecycleStore {
    /// Creates a new PostgreSQL lifecycle store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_line_item(row: PgRow) -> Result<LineItem> {
        let fulfillment_data = row
            .try_get::<Option<serde_json::Value>, _>("fulfillment_data")?
            .map(serde_json::from_value)
            .transpose()?;
        let status_history = serde_json::from_value(row.try_get("status_history")?)?;

        Ok(LineItem {
            id: LineItemId::from_uuid(row.try_get::<Uuid, _>("id")?),
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            item_type: row.try_get::<String, _>("item_type")?.parse()?,
            status: row.try_get::<String, _>("status")?.parse()?,
            fulfillment_status: row.try_get::<String, _>("fulfillment_status")?.parse()?,
            fulfillment_data,
            status_history,
            last_status_change: row.try_get("last_status_change")?,
            revision: Revision::from(row.try_get::<i64, _>("revision")?),
        })
    }

    fn row_to_order(row: PgRow, items: Vec<LineItem>) -> Result<Order> {
        Ok(Order {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            status: row.try_get::<String, _>("status")?.parse()?,
            payment_status: row.try_get::<String, _>("payment_status")?.parse()?,
            items,
            revision: Revision::from(row.try_get::<i64, _>("revision")?),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_event(row: PgRow) -> Result<OutboxEvent> {
        Ok(OutboxEvent {
            id: EventId::from_uuid(row.try_get::<Uuid, _>("id")?),
            aggregate_id: row.try_get("aggregate_id")?,
            aggregate_kind: row.try_get::<String, _>("aggregate_type")?.parse()?,
            event_type: row.try_get("event_type")?,
            payload: row.try_get("payload")?,
            status: row.try_get::<String, _>("status")?.parse()?,
            retry_count: row.try_get("retry_count")?,
            next_retry_at: row.try_get("next_retry_at")?,
            idempotency_key: row.try_get("idempotency_key")?,
            error_message: row.try_get("error_message")?,
            first_failed_at: row.try_get("first_failed_at")?,
            claimed_at: row.try_get("claimed_at")?,
            created_at: row.try_get("created_at")?,
            processed_at: row.try_get("processed_at")?,
        })
    }

    fn row_to_transition(row: PgRow) -> Result<StatusTransition> {
        let subject = TransitionSubject::from_columns(
            row.try_get("order_id")?,
            row.try_get("line_item_id")?,
        )
        .map_err(StoreError::Decode)?;

        Ok(StatusTransition {
            id: row.try_get("id")?,
            subject,
            from_status: row.try_get("from_status")?,
            to_status: row.try_get("to_status")?,
            reason: row.try_get("reason")?,
            metadata: row.try_get("metadata")?,
            created_by: row.try_get("created_by")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_dlq_entry(row: PgRow) -> Result<DlqEntry> {
        Ok(DlqEntry {
            id: DlqEntryId::from_uuid(row.try_get::<Uuid, _>("id")?),
            original_event_id: EventId::from_uuid(row.try_get::<Uuid, _>("original_event_id")?),
            aggregate_id: row.try_get("aggregate_id")?,
            aggregate_kind: row.try_get::<String, _>("aggregate_type")?.parse()?,
            event_type: row.try_get("event_type")?,
            payload: row.try_get("payload")?,
            idempotency_key: row.try_get("idempotency_key")?,
            error_message: row.try_get("error_message")?,
            retry_count: row.try_get("retry_count")?,
            first_failed_at: row.try_get("first_failed_at")?,
            moved_to_dlq_at: row.try_get("moved_to_dlq_at")?,
            reprocessed: row.try_get("reprocessed")?,
            reprocessed_at: row.try_get("reprocessed_at")?,
        })
    }

    async fn items_for_order(&self, order_id: OrderId) -> Result<Vec<LineItem>> {
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, item_type, status, fulfillment_status, fulfillment_data,
                   status_history, last_status_change, revision
            FROM order_line_items
            WHERE order_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_line_item).collect()
    }
}

/// Enqueues an outbox row inside `tx`, silently skipping rows whose
/// idempotency key is already present.
async fn insert_event(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    event: &OutboxEvent,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO outbox_events (id, aggregate_id, aggregate_type, event_type, payload,
                                   status, retry_count, next_retry_at, idempotency_key,
                                   error_message, first_failed_at, claimed_at, created_at,
                                   processed_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        ON CONFLICT (idempotency_key) DO NOTHING
        "#,
    )
    .bind(event.id.as_uuid())
    .bind(event.aggregate_id)
    .bind(event.aggregate_kind.as_str())
    .bind(&event.event_type)
    .bind(&event.payload)
    .bind(event.status.as_str())
    .bind(event.retry_count)
    .bind(event.next_retry_at)
    .bind(&event.idempotency_key)
    .bind(&event.error_message)
    .bind(event.first_failed_at)
    .bind(event.claimed_at)
    .bind(event.created_at)
    .bind(event.processed_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

#[async_trait]
impl LifecycleStore for PostgresLifecycleStore {
    async fn insert_order(&self, order: &Order, events: Vec<OutboxEvent>) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, status, payment_status, revision, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .bind(order.revision.as_i64())
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await?;

        for item in &order.items {
            let fulfillment_data = item
                .fulfillment_data
                .as_ref()
                .map(serde_json::to_value)
                .transpose()?;

            sqlx::query(
                r#"
                INSERT INTO order_line_items (id, order_id, item_type, status, fulfillment_status,
                                              fulfillment_data, status_history, last_status_change,
                                              revision, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(item.id.as_uuid())
            .bind(item.order_id.as_uuid())
            .bind(item.item_type.as_str())
            .bind(item.status.as_str())
            .bind(item.fulfillment_status.as_str())
            .bind(fulfillment_data)
            .bind(serde_json::to_value(&item.status_history)?)
            .bind(item.last_status_change)
            .bind(item.revision.as_i64())
            .bind(order.created_at)
            .execute(&mut *tx)
            .await?;
        }

        for event in &events {
            insert_event(&mut tx, event).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(
            r#"
            SELECT id, status, payment_status, revision, created_at, updated_at
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let items = self.items_for_order(order_id).await?;
                Ok(Some(Self::row_to_order(row, items)?))
            }
            None => Ok(None),
        }
    }

    async fn get_order_for_item(&self, line_item_id: LineItemId) -> Result<Option<Order>> {
        let order_id: Option<Uuid> =
            sqlx::query_scalar("SELECT order_id FROM order_line_items WHERE id = $1")
                .bind(line_item_id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;

        match order_id {
            Some(order_id) => self.get_order(OrderId::from_uuid(order_id)).await,
            None => Ok(None),
        }
    }

    async fn get_line_item(&self, line_item_id: LineItemId) -> Result<Option<LineItem>> {
        let row = sqlx::query(
            r#"
            SELECT id, order_id, item_type, status, fulfillment_status, fulfillment_data,
                   status_history, last_status_change, revision
            FROM order_line_items
            WHERE id = $1
            "#,
        )
        .bind(line_item_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_line_item).transpose()
    }

    async fn commit_transition(&self, commit: TransitionCommit) -> Result<()> {
        validate_commit(&commit)?;

        let mut tx = self.pool.begin().await?;

        // Conditional write: the row must still be at the revision the
        // caller read. Zero rows touched means someone else won the race.
        let fulfillment_data = commit
            .item
            .fulfillment_data
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;

        let item_update = sqlx::query(
            r#"
            UPDATE order_line_items
            SET status = $1, fulfillment_status = $2, fulfillment_data = $3,
                status_history = $4, last_status_change = $5, revision = $6
            WHERE id = $7 AND revision = $8
            "#,
        )
        .bind(commit.item.status.as_str())
        .bind(commit.item.fulfillment_status.as_str())
        .bind(fulfillment_data)
        .bind(serde_json::to_value(&commit.item.status_history)?)
        .bind(commit.item.last_status_change)
        .bind(commit.item.revision.as_i64())
        .bind(commit.item.id.as_uuid())
        .bind(commit.expected_item_revision.as_i64())
        .execute(&mut *tx)
        .await?;

        if item_update.rows_affected() == 0 {
            let actual: Option<i64> =
                sqlx::query_scalar("SELECT revision FROM order_line_items WHERE id = $1")
                    .bind(commit.item.id.as_uuid())
                    .fetch_optional(&mut *tx)
                    .await?;

            return Err(match actual {
                Some(actual) => StoreError::ConcurrentModification {
                    entity: "line_item",
                    id: commit.item.id.as_uuid(),
                    expected: commit.expected_item_revision,
                    actual: Revision::from(actual),
                },
                None => StoreError::LineItemNotFound(commit.item.id),
            });
        }

        let order_update = sqlx::query(
            r#"
            UPDATE orders
            SET status = $1, payment_status = $2, updated_at = $3, revision = revision + 1
            WHERE id = $4 AND revision = $5
            "#,
        )
        .bind(commit.order.status.as_str())
        .bind(commit.order.payment_status.as_str())
        .bind(commit.order.updated_at)
        .bind(commit.order.order_id.as_uuid())
        .bind(commit.order.expected_revision.as_i64())
        .execute(&mut *tx)
        .await?;

        if order_update.rows_affected() == 0 {
            let actual: Option<i64> =
                sqlx::query_scalar("SELECT revision FROM orders WHERE id = $1")
                    .bind(commit.order.order_id.as_uuid())
                    .fetch_optional(&mut *tx)
                    .await?;

            return Err(match actual {
                Some(actual) => StoreError::ConcurrentModification {
                    entity: "order",
                    id: commit.order.order_id.as_uuid(),
                    expected: commit.order.expected_revision,
                    actual: Revision::from(actual),
                },
                None => StoreError::OrderNotFound(commit.order.order_id),
            });
        }

        for transition in &commit.transitions {
            let (order_id, line_item_id) = transition.subject.as_columns();
            sqlx::query(
                r#"
                INSERT INTO status_transitions (id, order_id, line_item_id, from_status,
                                                to_status, reason, metadata, created_by,
                                                created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(transition.id)
            .bind(order_id)
            .bind(line_item_id)
            .bind(&transition.from_status)
            .bind(&transition.to_status)
            .bind(&transition.reason)
            .bind(&transition.metadata)
            .bind(&transition.created_by)
            .bind(transition.created_at)
            .execute(&mut *tx)
            .await?;
        }

        for event in &commit.events {
            insert_event(&mut tx, event).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn transitions_for_order(&self, order_id: OrderId) -> Result<Vec<StatusTransition>> {
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, line_item_id, from_status, to_status, reason, metadata,
                   created_by, created_at
            FROM status_transitions
            WHERE order_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_transition).collect()
    }

    async fn transitions_for_item(
        &self,
        line_item_id: LineItemId,
    ) -> Result<Vec<StatusTransition>> {
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, line_item_id, from_status, to_status, reason, metadata,
                   created_by, created_at
            FROM status_transitions
            WHERE line_item_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(line_item_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_transition).collect()
    }

    async fn claim_due_events(
        &self,
        batch_size: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<OutboxEvent>> {
        // Claim and flip in one statement. Only the oldest unsettled row of
        // each aggregate is eligible, so a row in flight or waiting out its
        // backoff blocks everything behind it on the same aggregate.
        // SKIP LOCKED keeps concurrent workers from blocking on each other.
        let sql = format!(
            r#"
            WITH heads AS (
                SELECT DISTINCT ON (aggregate_id) id
                FROM outbox_events
                WHERE status <> 'processed'
                ORDER BY aggregate_id, created_at, seq
            ),
            due AS (
                SELECT e.id AS event_id
                FROM outbox_events e
                JOIN heads h ON h.id = e.id
                WHERE e.status = 'pending'
                   OR (e.status = 'failed'
                       AND (e.next_retry_at IS NULL OR e.next_retry_at <= $2))
                ORDER BY e.created_at, e.seq
                LIMIT $1
                FOR UPDATE OF e SKIP LOCKED
            )
            UPDATE outbox_events o
            SET status = 'processing', claimed_at = $2
            FROM due
            WHERE o.id = due.event_id
            RETURNING {EVENT_COLUMNS}
            "#
        );

        let rows = sqlx::query(&sql)
            .bind(batch_size as i64)
            .bind(now)
            .fetch_all(&self.pool)
            .await?;

        let mut events = rows
            .into_iter()
            .map(Self::row_to_event)
            .collect::<Result<Vec<_>>>()?;
        // UPDATE .. RETURNING makes no ordering promise.
        events.sort_by_key(|event| event.created_at);

        if !events.is_empty() {
            metrics::counter!("outbox_events_claimed_total").increment(events.len() as u64);
            tracing::debug!(claimed = events.len(), "claimed outbox events");
        }
        Ok(events)
    }

    async fn mark_processed(&self, event_id: EventId, now: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_events
            SET status = 'processed', processed_at = $2, claimed_at = NULL
            WHERE id = $1
            "#,
        )
        .bind(event_id.as_uuid())
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::EventNotFound(event_id));
        }
        Ok(())
    }

    async fn mark_failed(
        &self,
        event_id: EventId,
        error_message: &str,
        next_retry_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_events
            SET status = 'failed', retry_count = retry_count + 1, error_message = $2,
                next_retry_at = $3, first_failed_at = COALESCE(first_failed_at, $4),
                claimed_at = NULL
            WHERE id = $1
            "#,
        )
        .bind(event_id.as_uuid())
        .bind(error_message)
        .bind(next_retry_at)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::EventNotFound(event_id));
        }
        Ok(())
    }

    async fn release_stuck(&self, stale_before: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_events
            SET status = 'pending', claimed_at = NULL
            WHERE status = 'processing' AND claimed_at < $1
            "#,
        )
        .bind(stale_before)
        .execute(&self.pool)
        .await?;

        let released = result.rows_affected();
        if released > 0 {
            metrics::counter!("outbox_events_released_total").increment(released);
            tracing::warn!(released, "released outbox events stuck in processing");
        }
        Ok(released)
    }

    async fn get_event(&self, event_id: EventId) -> Result<Option<OutboxEvent>> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM outbox_events WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(event_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_event).transpose()
    }

    async fn pending_event_count(&self) -> Result<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM outbox_events WHERE status = 'pending'")
                .fetch_one(&self.pool)
                .await?;

        Ok(count as u64)
    }

    async fn move_to_dlq(&self, entry: DlqEntry) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query("DELETE FROM outbox_events WHERE id = $1")
            .bind(entry.original_event_id.as_uuid())
            .execute(&mut *tx)
            .await?;
        if removed.rows_affected() == 0 {
            return Err(StoreError::EventNotFound(entry.original_event_id));
        }

        sqlx::query(
            r#"
            INSERT INTO dlq_entries (id, original_event_id, aggregate_id, aggregate_type,
                                     event_type, payload, idempotency_key, error_message,
                                     retry_count, first_failed_at, moved_to_dlq_at,
                                     reprocessed, reprocessed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(entry.id.as_uuid())
        .bind(entry.original_event_id.as_uuid())
        .bind(entry.aggregate_id)
        .bind(entry.aggregate_kind.as_str())
        .bind(&entry.event_type)
        .bind(&entry.payload)
        .bind(&entry.idempotency_key)
        .bind(&entry.error_message)
        .bind(entry.retry_count)
        .bind(entry.first_failed_at)
        .bind(entry.moved_to_dlq_at)
        .bind(entry.reprocessed)
        .bind(entry.reprocessed_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::warn!(
            event_id = %entry.original_event_id,
            event_type = %entry.event_type,
            retry_count = entry.retry_count,
            "moved outbox event to the dead letter queue"
        );
        Ok(())
    }

    async fn get_dlq_entry(&self, entry_id: DlqEntryId) -> Result<Option<DlqEntry>> {
        let sql = format!("SELECT {DLQ_COLUMNS} FROM dlq_entries WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(entry_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_dlq_entry).transpose()
    }

    async fn list_dlq_entries(&self, include_reprocessed: bool) -> Result<Vec<DlqEntry>> {
        let sql = if include_reprocessed {
            format!("SELECT {DLQ_COLUMNS} FROM dlq_entries ORDER BY moved_to_dlq_at DESC")
        } else {
            format!(
                "SELECT {DLQ_COLUMNS} FROM dlq_entries WHERE NOT reprocessed \
                 ORDER BY moved_to_dlq_at DESC"
            )
        };

        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_dlq_entry).collect()
    }

    async fn reprocess_dlq_entry(
        &self,
        entry_id: DlqEntryId,
        now: DateTime<Utc>,
    ) -> Result<OutboxEvent> {
        let mut tx = self.pool.begin().await?;

        // Row lock serializes concurrent reprocess calls on the same entry;
        // the loser sees the flipped flag.
        let sql = format!("SELECT {DLQ_COLUMNS} FROM dlq_entries WHERE id = $1 FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(entry_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(StoreError::DlqEntryNotFound(entry_id))?;

        let entry = Self::row_to_dlq_entry(row)?;
        if entry.reprocessed {
            return Err(StoreError::AlreadyReprocessed(entry_id));
        }

        let replacement = entry.replacement_event(now);
        sqlx::query(
            r#"
            INSERT INTO outbox_events (id, aggregate_id, aggregate_type, event_type, payload,
                                       status, retry_count, next_retry_at, idempotency_key,
                                       error_message, first_failed_at, claimed_at, created_at,
                                       processed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(replacement.id.as_uuid())
        .bind(replacement.aggregate_id)
        .bind(replacement.aggregate_kind.as_str())
        .bind(&replacement.event_type)
        .bind(&replacement.payload)
        .bind(replacement.status.as_str())
        .bind(replacement.retry_count)
        .bind(replacement.next_retry_at)
        .bind(&replacement.idempotency_key)
        .bind(&replacement.error_message)
        .bind(replacement.first_failed_at)
        .bind(replacement.claimed_at)
        .bind(replacement.created_at)
        .bind(replacement.processed_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE dlq_entries SET reprocessed = TRUE, reprocessed_at = $2 WHERE id = $1")
            .bind(entry_id.as_uuid())
            .bind(now)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(replacement)
    }
}
