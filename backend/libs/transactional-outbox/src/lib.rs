//! # Transactional Outbox
//!
//! Domain writes and the events describing them are committed together: the
//! service inserts an `outbox_events` row in the same transaction as its state
//! change, and a separate relay ([`OutboxProcessor`]) publishes pending rows to
//! Kafka and marks them sent once the broker has acknowledged them.
//!
//! Delivery is at-least-once. A crash between publish and `mark_published`
//! republishes the row, so consumers must apply events idempotently.
//!
//! ## Enqueue inside a transaction
//!
//! ```rust,no_run
//! use event_schema::{AccountCreated, Role};
//! use sqlx::PgPool;
//! use transactional_outbox::{OutboxEvent, SqlxOutboxRepository};
//! use uuid::Uuid;
//!
//! async fn create_account(pool: &PgPool) -> Result<(), Box<dyn std::error::Error>> {
//!     let mut tx = pool.begin().await?;
//!     let pid = Uuid::new_v4();
//!
//!     sqlx::query("INSERT INTO accounts (pid, role) VALUES ($1, 'worker')")
//!         .bind(pid)
//!         .execute(&mut *tx)
//!         .await?;
//!
//!     let event = OutboxEvent::from_event(AccountCreated {
//!         pid,
//!         role: Role::Worker,
//!         email: "worker@popug.dev".to_string(),
//!     })?;
//!     SqlxOutboxRepository::insert(&mut tx, &event).await?;
//!
//!     tx.commit().await?;
//!     Ok(())
//! }
//! ```

use chrono::{DateTime, Utc};
use event_schema::DomainEvent;
use resilience::{Backoff, BackoffConfig};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

mod error;
pub mod metrics;
pub mod processor;
pub mod publisher;
pub mod repository;

pub use error::{OutboxError, OutboxResult};
pub use metrics::OutboxMetrics;
pub use processor::{OutboxConfig, OutboxProcessor};
pub use publisher::{create_producer, KafkaOutboxPublisher, OutboxPublisher};
pub use repository::{OutboxRepository, PendingStats, SqlxOutboxRepository};

/// A row of the outbox table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEvent {
    pub id: Uuid,

    /// Kind of entity the event belongs to ("account", "task")
    pub aggregate_type: String,

    /// Entity id; also the Kafka partition key
    pub aggregate_id: Uuid,

    /// Wire name of the event, e.g. `Accounts.UpdateAccount`
    pub event_type: String,

    /// Destination topic
    pub topic: String,

    /// The full envelope, published verbatim
    pub payload: serde_json::Value,

    pub created_at: DateTime<Utc>,

    /// None until the broker acknowledged the send
    pub published_at: Option<DateTime<Utc>>,

    pub retry_count: i32,

    pub last_error: Option<String>,

    /// When the last failed attempt happened; drives the retry backoff
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl OutboxEvent {
    /// Wrap a domain event into its envelope and build the pending row for it.
    pub fn from_event<E: DomainEvent>(event: E) -> OutboxResult<Self> {
        let aggregate_id = event.aggregate_id();
        let payload = event.into_envelope().to_value()?;

        Ok(Self {
            id: Uuid::new_v4(),
            aggregate_type: E::AGGREGATE.to_string(),
            aggregate_id,
            event_type: E::NAME.to_string(),
            topic: E::TOPIC.to_string(),
            payload,
            created_at: Utc::now(),
            published_at: None,
            retry_count: 0,
            last_error: None,
            last_attempt_at: None,
        })
    }

    /// Whether a failed row has waited out its backoff.
    pub fn is_due(&self, now: DateTime<Utc>, backoff: &BackoffConfig) -> bool {
        let Some(last_attempt) = self.last_attempt_at else {
            return true;
        };
        let attempt = self.retry_count.saturating_sub(1).max(0) as u32;
        let wait = Backoff::delay_for_attempt(backoff, attempt);
        match chrono::Duration::from_std(wait) {
            Ok(wait) => now >= last_attempt + wait,
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use event_schema::{AccountUpdated, Role};
    use std::time::Duration;

    fn backoff() -> BackoffConfig {
        BackoffConfig {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(300),
            multiplier: 2.0,
            jitter: false,
        }
    }

    #[test]
    fn test_from_event_builds_pending_row() {
        let pid = Uuid::new_v4();
        let event = OutboxEvent::from_event(AccountUpdated {
            pid,
            role: Role::Manager,
            email: "m@popug.dev".to_string(),
        })
        .unwrap();

        assert_eq!(event.aggregate_type, "account");
        assert_eq!(event.aggregate_id, pid);
        assert_eq!(event.event_type, "Accounts.UpdateAccount");
        assert_eq!(event.topic, "identity-changes");
        assert_eq!(event.payload["meta"]["name"], "Accounts.UpdateAccount");
        assert_eq!(event.payload["data"]["role"], "manager");
        assert!(event.published_at.is_none());
        assert_eq!(event.retry_count, 0);
    }

    #[test]
    fn test_fresh_event_is_due() {
        let event = OutboxEvent::from_event(event_schema::AccountDeleted {
            pid: Uuid::new_v4(),
        })
        .unwrap();
        assert!(event.is_due(Utc::now(), &backoff()));
    }

    #[test]
    fn test_failed_event_waits_for_backoff() {
        let now = Utc::now();
        let mut event = OutboxEvent::from_event(event_schema::AccountDeleted {
            pid: Uuid::new_v4(),
        })
        .unwrap();
        event.retry_count = 3;
        event.last_attempt_at = Some(now);

        // third failure waits 4s
        assert!(!event.is_due(now + chrono::Duration::seconds(3), &backoff()));
        assert!(event.is_due(now + chrono::Duration::seconds(4), &backoff()));
    }
}
