//! Error types for the transactional outbox library.

use event_schema::EnvelopeError;
use thiserror::Error;
use uuid::Uuid;

/// Result type alias for outbox operations.
pub type OutboxResult<T> = Result<T, OutboxError>;

#[derive(Error, Debug)]
pub enum OutboxError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Event not found: {0}")]
    EventNotFound(Uuid),

    /// The broker did not acknowledge the send
    #[error("Publish failed: {0}")]
    PublishFailed(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Envelope error: {0}")]
    Envelope(#[from] EnvelopeError),

    #[error("Outbox error: {0}")]
    Other(#[from] anyhow::Error),
}
