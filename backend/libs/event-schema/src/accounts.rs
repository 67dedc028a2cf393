use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{is_compatible, topics, DomainEvent, EnvelopeError, RawEnvelope, Role, SCHEMA_VERSION};

pub const CREATE_ACCOUNT: &str = "Accounts.CreateAccount";
pub const UPDATE_ACCOUNT: &str = "Accounts.UpdateAccount";
pub const DELETE_ACCOUNT: &str = "Accounts.DeleteAccount";

const AGGREGATE: &str = "account";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountCreated {
    pub pid: Uuid,
    pub role: Role,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountUpdated {
    pub pid: Uuid,
    pub role: Role,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountDeleted {
    pub pid: Uuid,
}

impl DomainEvent for AccountCreated {
    const NAME: &'static str = CREATE_ACCOUNT;
    const TOPIC: &'static str = topics::IDENTITY_CHANGES;
    const AGGREGATE: &'static str = AGGREGATE;

    fn aggregate_id(&self) -> Uuid {
        self.pid
    }
}

impl DomainEvent for AccountUpdated {
    const NAME: &'static str = UPDATE_ACCOUNT;
    const TOPIC: &'static str = topics::IDENTITY_CHANGES;
    const AGGREGATE: &'static str = AGGREGATE;

    fn aggregate_id(&self) -> Uuid {
        self.pid
    }
}

impl DomainEvent for AccountDeleted {
    const NAME: &'static str = DELETE_ACCOUNT;
    const TOPIC: &'static str = topics::IDENTITY_CHANGES;
    const AGGREGATE: &'static str = AGGREGATE;

    fn aggregate_id(&self) -> Uuid {
        self.pid
    }
}

/// Any event published on the identity topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountEvent {
    Created(AccountCreated),
    Updated(AccountUpdated),
    Deleted(AccountDeleted),
}

impl AccountEvent {
    /// Decode a raw message.
    ///
    /// Returns `Ok(None)` for event names this consumer does not handle;
    /// those are ignorable. A payload that does not match its declared name
    /// is an error.
    pub fn decode(bytes: &[u8]) -> Result<Option<Self>, EnvelopeError> {
        Self::from_envelope(RawEnvelope::parse(bytes)?)
    }

    pub fn from_envelope(raw: RawEnvelope) -> Result<Option<Self>, EnvelopeError> {
        if !is_compatible(SCHEMA_VERSION, raw.meta.version) {
            return Err(EnvelopeError::UnsupportedVersion {
                name: raw.meta.name,
                version: raw.meta.version,
            });
        }

        let event = match raw.meta.name.as_str() {
            CREATE_ACCOUNT => AccountEvent::Created(raw.payload()?),
            UPDATE_ACCOUNT => AccountEvent::Updated(raw.payload()?),
            DELETE_ACCOUNT => AccountEvent::Deleted(raw.payload()?),
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    pub fn pid(&self) -> Uuid {
        match self {
            AccountEvent::Created(e) => e.pid,
            AccountEvent::Updated(e) => e.pid,
            AccountEvent::Deleted(e) => e.pid,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AccountEvent::Created(_) => CREATE_ACCOUNT,
            AccountEvent::Updated(_) => UPDATE_ACCOUNT,
            AccountEvent::Deleted(_) => DELETE_ACCOUNT,
        }
    }
}
