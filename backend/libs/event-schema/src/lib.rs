//! Event contract shared by every producer and consumer of the identity and
//! task streams.
//!
//! Every message on the wire is an envelope `{"meta": {...}, "data": {...}}`.
//! The shape of `data` is fixed by `meta.name`; consumers ignore names they do
//! not know.

use chrono::Utc;
use serde::{de, de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use uuid::Uuid;

// Account CUD events replicated to resource services
pub mod accounts;
pub mod error;
pub mod role;
// Task lifecycle events (produced, never consumed here)
pub mod tasks;

pub use accounts::{AccountCreated, AccountDeleted, AccountEvent, AccountUpdated};
pub use error::{EnvelopeError, UnknownRole};
pub use role::Role;
pub use tasks::{TaskAdded, TaskCompleted, TaskCreated, TaskReshuffled};

/// Current schema version written into every envelope
pub const SCHEMA_VERSION: u32 = 1;

/// Kafka topic names
pub mod topics {
    pub const IDENTITY_CHANGES: &str = "identity-changes";
    pub const TASKS_STREAM: &str = "tasks-stream";
    pub const TASKS_ADDED: &str = "tasks.added";
    pub const TASKS_COMPLETED: &str = "tasks.completed";
    pub const TASKS_RESHUFFLED: &str = "tasks.reshuffled";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMeta {
    /// Epoch seconds at publish time. Fractional seconds on the wire are
    /// truncated.
    #[serde(deserialize_with = "epoch_seconds")]
    pub created_at: i64,
    /// Dotted event type, e.g. `Accounts.CreateAccount`
    pub name: String,
    /// Absent on envelopes written before versioning, read as 1
    #[serde(default = "default_version")]
    pub version: u32,
}

fn default_version() -> u32 {
    SCHEMA_VERSION
}

fn epoch_seconds<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    struct EpochSeconds;

    impl de::Visitor<'_> for EpochSeconds {
        type Value = i64;

        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            f.write_str("epoch seconds as an integer or float")
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<i64, E> {
            Ok(v)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<i64, E> {
            i64::try_from(v).map_err(|_| E::custom(format!("epoch seconds out of range: {v}")))
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<i64, E> {
            if v.is_finite() && v >= i64::MIN as f64 && v < i64::MAX as f64 {
                Ok(v.trunc() as i64)
            } else {
                Err(E::custom(format!("epoch seconds out of range: {v}")))
            }
        }
    }

    deserializer.deserialize_any(EpochSeconds)
}

/// Envelope around every event payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope<T> {
    pub meta: EventMeta,
    pub data: T,
}

impl<T> EventEnvelope<T> {
    pub fn new(name: impl Into<String>, data: T) -> Self {
        Self {
            meta: EventMeta {
                created_at: Utc::now().timestamp(),
                name: name.into(),
                version: SCHEMA_VERSION,
            },
            data,
        }
    }

    pub fn at(mut self, created_at: i64) -> Self {
        self.meta.created_at = created_at;
        self
    }
}

impl<T: Serialize> EventEnvelope<T> {
    pub fn to_value(&self) -> Result<serde_json::Value, EnvelopeError> {
        serde_json::to_value(self).map_err(|source| EnvelopeError::Encode {
            name: self.meta.name.clone(),
            source,
        })
    }
}

/// Envelope whose payload has not been bound to a concrete event type yet
pub type RawEnvelope = EventEnvelope<serde_json::Value>;

impl RawEnvelope {
    pub fn parse(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        serde_json::from_slice(bytes).map_err(EnvelopeError::Malformed)
    }

    /// Bind the payload to `E`, failing when `data` does not have its shape.
    pub fn payload<E: DomainEvent>(self) -> Result<E, EnvelopeError> {
        serde_json::from_value(self.data).map_err(|source| EnvelopeError::PayloadMismatch {
            name: self.meta.name,
            source,
        })
    }
}

/// An event with a fixed wire name and destination topic.
///
/// `aggregate_id` doubles as the Kafka partition key so that every event for
/// one aggregate lands on the same partition, in order.
pub trait DomainEvent: Serialize + DeserializeOwned {
    const NAME: &'static str;
    const TOPIC: &'static str;
    const AGGREGATE: &'static str;

    fn aggregate_id(&self) -> Uuid;

    fn into_envelope(self) -> EventEnvelope<Self>
    where
        Self: Sized,
    {
        EventEnvelope::new(Self::NAME, self)
    }
}

// ============================================================================
// Version compatibility helpers
// ============================================================================

/// Older payloads are readable; newer ones are not.
pub fn is_compatible(current_version: u32, message_version: u32) -> bool {
    message_version <= current_version
}
