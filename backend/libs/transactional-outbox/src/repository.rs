use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use resilience::BackoffConfig;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{OutboxError, OutboxEvent, OutboxResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingStats {
    pub pending: i64,
    /// Zero when nothing is pending
    pub oldest_age_seconds: i64,
}

/// Relay-side access to the outbox table.
///
/// Enqueueing is not part of this trait: it must happen on the caller's own
/// transaction, see [`SqlxOutboxRepository::insert`].
#[async_trait]
pub trait OutboxRepository: Send + Sync {
    /// Unpublished rows the relay may attempt now, oldest first.
    ///
    /// A row is blocked once it has failed `max_retries` times or while its
    /// `backoff` delay since the last attempt has not elapsed. Blocked rows
    /// are left out, and so is every later row of the same aggregate. Rows of
    /// other aggregates queued behind them are still returned.
    async fn get_sendable(
        &self,
        limit: i64,
        max_retries: i32,
        backoff: &BackoffConfig,
    ) -> OutboxResult<Vec<OutboxEvent>>;

    async fn mark_published(&self, event_id: Uuid) -> OutboxResult<()>;

    /// Increment the retry count and record the error and attempt time.
    async fn mark_failed(&self, event_id: Uuid, error: &str) -> OutboxResult<()>;

    async fn pending_stats(&self) -> OutboxResult<PendingStats>;
}

pub struct SqlxOutboxRepository {
    pool: PgPool,
}

impl SqlxOutboxRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a pending row on an open transaction.
    ///
    /// The row becomes visible to the relay only when the caller commits, so
    /// a rolled-back state change never produces an event.
    pub async fn insert(
        tx: &mut Transaction<'_, Postgres>,
        event: &OutboxEvent,
    ) -> OutboxResult<()> {
        sqlx::query(
            r#"
            INSERT INTO outbox_events (
                id,
                aggregate_type,
                aggregate_id,
                event_type,
                topic,
                payload,
                created_at,
                published_at,
                retry_count,
                last_error,
                last_attempt_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(event.id)
        .bind(&event.aggregate_type)
        .bind(event.aggregate_id)
        .bind(&event.event_type)
        .bind(&event.topic)
        .bind(&event.payload)
        .bind(event.created_at)
        .bind(event.published_at)
        .bind(event.retry_count)
        .bind(&event.last_error)
        .bind(event.last_attempt_at)
        .execute(&mut **tx)
        .await
        .context("Failed to insert event into outbox")?;

        debug!(
            event_id = %event.id,
            event_type = %event.event_type,
            aggregate_id = %event.aggregate_id,
            "Event inserted into outbox"
        );

        Ok(())
    }

    /// Reset rows created since `ts` so the relay publishes them again.
    pub async fn replay_since(&self, ts: DateTime<Utc>) -> OutboxResult<u64> {
        let res = sqlx::query(
            r#"
            UPDATE outbox_events
            SET published_at = NULL,
                retry_count = 0,
                last_error = NULL,
                last_attempt_at = NULL
            WHERE created_at >= $1
            "#,
        )
        .bind(ts)
        .execute(&self.pool)
        .await
        .context("Failed to replay events since timestamp")?;

        Ok(res.rows_affected())
    }

    /// Give rows that exhausted their retries a fresh budget.
    pub async fn revive_exhausted(&self, max_retries: i32) -> OutboxResult<u64> {
        let res = sqlx::query(
            r#"
            UPDATE outbox_events
            SET retry_count = 0,
                last_attempt_at = NULL
            WHERE published_at IS NULL AND retry_count >= $1
            "#,
        )
        .bind(max_retries)
        .execute(&self.pool)
        .await
        .context("Failed to revive exhausted events")?;

        Ok(res.rows_affected())
    }
}

fn event_from_row(row: PgRow) -> Result<OutboxEvent, sqlx::Error> {
    Ok(OutboxEvent {
        id: row.try_get("id")?,
        aggregate_type: row.try_get("aggregate_type")?,
        aggregate_id: row.try_get("aggregate_id")?,
        event_type: row.try_get("event_type")?,
        topic: row.try_get("topic")?,
        payload: row.try_get("payload")?,
        created_at: row.try_get("created_at")?,
        published_at: row.try_get("published_at")?,
        retry_count: row.try_get("retry_count")?,
        last_error: row.try_get("last_error")?,
        last_attempt_at: row.try_get("last_attempt_at")?,
    })
}

#[async_trait]
impl OutboxRepository for SqlxOutboxRepository {
    async fn get_sendable(
        &self,
        limit: i64,
        max_retries: i32,
        backoff: &BackoffConfig,
    ) -> OutboxResult<Vec<OutboxEvent>> {
        // Delay mirrors Backoff::delay_for_attempt(retry_count - 1) without jitter
        let rows = sqlx::query(
            r#"
            WITH pending AS (
                SELECT
                    seq,
                    id,
                    aggregate_type,
                    aggregate_id,
                    event_type,
                    topic,
                    payload,
                    created_at,
                    published_at,
                    retry_count,
                    last_error,
                    last_attempt_at,
                    (
                        retry_count >= $2
                        OR (
                            last_attempt_at IS NOT NULL
                            AND last_attempt_at + INTERVAL '1 millisecond' * LEAST(
                                $3 * POWER($4, LEAST(GREATEST(retry_count - 1, 0), 63)),
                                $5
                            ) > NOW()
                        )
                    ) AS blocked
                FROM outbox_events
                WHERE published_at IS NULL
            )
            SELECT
                p.id,
                p.aggregate_type,
                p.aggregate_id,
                p.event_type,
                p.topic,
                p.payload,
                p.created_at,
                p.published_at,
                p.retry_count,
                p.last_error,
                p.last_attempt_at
            FROM pending p
            WHERE NOT p.blocked
              AND NOT EXISTS (
                  SELECT 1
                  FROM pending b
                  WHERE b.aggregate_id = p.aggregate_id
                    AND b.blocked
                    AND b.seq < p.seq
              )
            ORDER BY p.seq ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .bind(max_retries)
        .bind(backoff.initial.as_millis() as f64)
        .bind(backoff.multiplier)
        .bind(backoff.max.as_millis() as f64)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch sendable events")?;

        let events = rows
            .into_iter()
            .map(event_from_row)
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .context("Failed to parse events")?;

        debug!(count = events.len(), "Fetched sendable events");

        Ok(events)
    }

    async fn mark_published(&self, event_id: Uuid) -> OutboxResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_events
            SET published_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(event_id)
        .execute(&self.pool)
        .await
        .context("Failed to mark event as published")?;

        if result.rows_affected() == 0 {
            warn!(event_id = %event_id, "Event not found when marking as published");
            return Err(OutboxError::EventNotFound(event_id));
        }

        Ok(())
    }

    async fn mark_failed(&self, event_id: Uuid, error: &str) -> OutboxResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_events
            SET
                retry_count = retry_count + 1,
                last_error = $2,
                last_attempt_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(event_id)
        .bind(error)
        .execute(&self.pool)
        .await
        .context("Failed to mark event as failed")?;

        if result.rows_affected() == 0 {
            warn!(event_id = %event_id, "Event not found when marking as failed");
            return Err(OutboxError::EventNotFound(event_id));
        }

        Ok(())
    }

    async fn pending_stats(&self) -> OutboxResult<PendingStats> {
        let rec = sqlx::query(
            r#"
            SELECT
                COUNT(*)::BIGINT AS pending,
                EXTRACT(EPOCH FROM (NOW() - MIN(created_at)))::BIGINT AS age_seconds
            FROM outbox_events
            WHERE published_at IS NULL
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to compute pending stats")?;

        let pending: i64 = rec.try_get("pending")?;
        let age: Option<i64> = rec.try_get("age_seconds")?;
        Ok(PendingStats {
            pending,
            oldest_age_seconds: age.unwrap_or(0),
        })
    }
}
