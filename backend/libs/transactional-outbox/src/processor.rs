use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use resilience::BackoffConfig;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::metrics::OutboxMetrics;
use crate::{OutboxPublisher, OutboxRepository, OutboxResult};

#[derive(Debug, Clone)]
pub struct OutboxConfig {
    pub batch_size: i64,
    pub poll_interval: Duration,
    /// Rows that failed this many times stay pending until revived by hand
    pub max_retries: i32,
    pub backoff: BackoffConfig,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            poll_interval: Duration::from_secs(1),
            max_retries: 10,
            // 1s, 2s, 4s ... capped at 5 minutes
            backoff: BackoffConfig {
                initial: Duration::from_secs(1),
                max: Duration::from_secs(300),
                multiplier: 2.0,
                jitter: false,
            },
        }
    }
}

/// The relay: publishes pending outbox rows and marks them sent.
///
/// Rows of one aggregate go out in insertion order. When a row cannot be
/// sent, every later row of the same aggregate is held back, so a consumer
/// never sees an UPDATE before the CREATE it depends on. Stuck rows are
/// filtered out by the repository, so they never crowd unrelated
/// aggregates out of a batch.
pub struct OutboxProcessor<R: OutboxRepository, P: OutboxPublisher> {
    repository: Arc<R>,
    publisher: Arc<P>,
    config: OutboxConfig,
    metrics: Option<OutboxMetrics>,
}

impl<R: OutboxRepository, P: OutboxPublisher> OutboxProcessor<R, P> {
    pub fn new(repository: Arc<R>, publisher: Arc<P>, config: OutboxConfig) -> Self {
        Self {
            repository,
            publisher,
            config,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: OutboxMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Poll until `shutdown` flips to true or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            batch_size = self.config.batch_size,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            max_retries = self.config.max_retries,
            "Outbox relay starting"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.process_batch().await {
                Ok(0) => debug!("No events to publish"),
                Ok(count) => info!(published_count = count, "Published events from outbox"),
                Err(e) => error!(error = ?e, "Outbox relay error"),
            }

            self.refresh_gauges().await;

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Outbox relay stopped");
    }

    /// Publish one batch. Returns the number of rows acknowledged.
    pub async fn process_batch(&self) -> OutboxResult<usize> {
        let events = self
            .repository
            .get_sendable(
                self.config.batch_size,
                self.config.max_retries,
                &self.config.backoff,
            )
            .await?;
        let now = Utc::now();
        let mut held: HashSet<Uuid> = HashSet::new();
        let mut published = 0;

        for event in events {
            if held.contains(&event.aggregate_id) {
                continue;
            }

            if event.retry_count >= self.config.max_retries {
                warn!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    aggregate_id = %event.aggregate_id,
                    retry_count = event.retry_count,
                    last_error = ?event.last_error,
                    "Event exceeded max retries, holding aggregate (requires manual intervention)"
                );
                held.insert(event.aggregate_id);
                continue;
            }

            if !event.is_due(now, &self.config.backoff) {
                held.insert(event.aggregate_id);
                continue;
            }

            match self.publisher.publish(&event).await {
                Ok(()) => {
                    if let Err(e) = self.repository.mark_published(event.id).await {
                        // Delivered but not marked: the next cycle republishes it
                        error!(event_id = %event.id, error = ?e, "Failed to mark event as published");
                        held.insert(event.aggregate_id);
                        continue;
                    }
                    published += 1;
                    if let Some(metrics) = &self.metrics {
                        metrics.published.inc();
                    }
                }
                Err(e) => {
                    warn!(
                        event_id = %event.id,
                        event_type = %event.event_type,
                        retry_count = event.retry_count,
                        error = %e,
                        "Failed to publish event"
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics.failed.inc();
                    }
                    if let Err(mark_err) =
                        self.repository.mark_failed(event.id, &e.to_string()).await
                    {
                        error!(event_id = %event.id, error = ?mark_err, "Failed to mark event as failed");
                    }
                    held.insert(event.aggregate_id);
                }
            }
        }

        Ok(published)
    }

    async fn refresh_gauges(&self) {
        let Some(metrics) = &self.metrics else {
            return;
        };
        match self.repository.pending_stats().await {
            Ok(stats) => {
                metrics.pending.set(stats.pending);
                metrics.oldest_pending_age_seconds.set(stats.oldest_age_seconds);
            }
            Err(e) => debug!(error = ?e, "Failed to read outbox stats"),
        }
    }
}
