//! The polling dispatch loop.

use std::time::Duration;

use chrono::Utc;
use outbox::{DlqEntry, LifecycleStore, OutboxEvent, Result};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::backoff::BackoffPolicy;
use crate::publisher::{EventPublisher, PublishError};

/// Tuning for the dispatch and sweep loops.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// How often an idle dispatcher polls for due events.
    pub poll_interval: Duration,

    /// Upper bound on events claimed per cycle.
    pub batch_size: usize,

    /// Failed attempts allowed after the first before the event is dead
    /// lettered.
    pub max_retries: u32,

    /// Hard cap on a single publish call.
    pub publish_timeout: Duration,

    /// First retry delay; doubles per failure up to `max_backoff`.
    pub base_backoff: Duration,
    pub max_backoff: Duration,

    /// How long a claim may sit unresolved before the sweeper takes it back.
    pub stale_after: Duration,

    /// How often the sweeper runs.
    pub sweep_interval: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            batch_size: 32,
            max_retries: 5,
            publish_timeout: Duration::from_secs(10),
            base_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(300),
            stale_after: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(30),
        }
    }
}

/// What one dispatch cycle did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchStats {
    pub claimed: usize,
    pub published: usize,
    pub retried: usize,
    pub dead_lettered: usize,
}

/// Claims due events from the store and drives them through a publisher.
///
/// Any number of dispatchers may run against the same store; the claim
/// query hands each event to exactly one of them, and never hands out two
/// events of the same aggregate at once.
pub struct Dispatcher<S, P> {
    store: S,
    publisher: P,
    config: DispatcherConfig,
    backoff: BackoffPolicy,
}

impl<S, P> Dispatcher<S, P>
where
    S: LifecycleStore,
    P: EventPublisher,
{
    pub fn new(store: S, publisher: P, config: DispatcherConfig) -> Self {
        let backoff = BackoffPolicy::new(config.base_backoff, config.max_backoff);
        Self {
            store,
            publisher,
            config,
            backoff,
        }
    }

    /// Polls until the shutdown signal flips to true or its sender drops.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut tick = tokio::time::interval(self.config.poll_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if let Err(err) = self.run_once().await {
                        tracing::error!(error = %err, "dispatch cycle failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow_and_update() {
                        tracing::info!("dispatcher stopping");
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Runs the stuck-claim sweeper on its own interval until shutdown.
    pub async fn run_sweeper(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut tick = tokio::time::interval(self.config.sweep_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if let Err(err) = self.sweep_stuck().await {
                        tracing::error!(error = %err, "sweep failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow_and_update() {
                        tracing::info!("sweeper stopping");
                        return Ok(());
                    }
                }
            }
        }
    }

    /// One dispatch cycle: claim a batch, publish each event, settle it.
    #[tracing::instrument(skip(self))]
    pub async fn run_once(&self) -> Result<DispatchStats> {
        let events = self
            .store
            .claim_due_events(self.config.batch_size, Utc::now())
            .await?;

        let mut stats = DispatchStats {
            claimed: events.len(),
            ..DispatchStats::default()
        };

        for event in events {
            let publish_start = std::time::Instant::now();
            match self.deliver(&event).await {
                Ok(()) => {
                    metrics::histogram!("dispatcher_publish_duration_seconds")
                        .record(publish_start.elapsed().as_secs_f64());
                    self.store.mark_processed(event.id, Utc::now()).await?;
                    stats.published += 1;
                    metrics::counter!("dispatcher_events_published_total").increment(1);
                    tracing::debug!(
                        event_id = %event.id,
                        event_type = %event.event_type,
                        "event published"
                    );
                }
                Err(err) => {
                    self.settle_failure(&event, err, &mut stats).await?;
                }
            }
        }

        Ok(stats)
    }

    /// Returns abandoned claims to the pending pool.
    pub async fn sweep_stuck(&self) -> Result<u64> {
        let cutoff = Utc::now()
            - chrono::Duration::milliseconds(self.config.stale_after.as_millis() as i64);
        let released = self.store.release_stuck(cutoff).await?;
        if released > 0 {
            metrics::counter!("dispatcher_events_swept_total").increment(released);
        }
        Ok(released)
    }

    async fn deliver(&self, event: &OutboxEvent) -> std::result::Result<(), PublishError> {
        match tokio::time::timeout(self.config.publish_timeout, self.publisher.publish(event))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(PublishError::Timeout(self.config.publish_timeout)),
        }
    }

    /// Reschedules a failed event, or moves it to the DLQ once this failure
    /// pushes it past the retry budget.
    async fn settle_failure(
        &self,
        event: &OutboxEvent,
        err: PublishError,
        stats: &mut DispatchStats,
    ) -> Result<()> {
        let now = Utc::now();
        let message = err.to_string();
        let failures = event.retry_count as u32 + 1;

        if failures > self.config.max_retries {
            let mut dead = event.clone();
            dead.retry_count += 1;
            dead.error_message = Some(message.clone());
            dead.first_failed_at.get_or_insert(now);

            self.store.move_to_dlq(DlqEntry::from_event(&dead, now)).await?;
            stats.dead_lettered += 1;
            metrics::counter!("dispatcher_events_dead_lettered_total").increment(1);
            tracing::error!(
                event_id = %event.id,
                event_type = %event.event_type,
                failures,
                error = %message,
                "retries exhausted, event moved to dead letter queue"
            );
        } else {
            let delay = self.backoff.delay(event.retry_count as u32);
            let next_retry_at = now + chrono::Duration::milliseconds(delay.as_millis() as i64);

            self.store
                .mark_failed(event.id, &message, Some(next_retry_at), now)
                .await?;
            stats.retried += 1;
            metrics::counter!("dispatcher_events_retried_total").increment(1);
            tracing::warn!(
                event_id = %event.id,
                event_type = %event.event_type,
                failures,
                delay_ms = delay.as_millis() as u64,
                error = %message,
                "publish failed, retry scheduled"
            );
        }

        Ok(())
    }
}
