use chrono::{DateTime, Utc};
use event_schema::Role;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Account model - the identity source of truth
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub pid: Uuid,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Public projection returned by the accounts API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountView {
    pub pid: Uuid,
    pub username: String,
    pub email: String,
    pub role: Role,
}

impl From<Account> for AccountView {
    fn from(account: Account) -> Self {
        Self {
            pid: account.pid,
            username: account.username,
            email: account.email,
            role: account.role,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateAccountRequest {
    #[validate(length(min = 1, max = 64))]
    pub username: String,
    #[validate(length(min = 1))]
    pub password: String,
    #[validate(email)]
    pub email: String,
    #[serde(default)]
    pub role: Role,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateAccountRequest {
    #[validate(email)]
    pub email: String,
    pub role: Role,
}

/// Row to insert; `password_hash` is already hashed
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub pid: Uuid,
    pub username: String,
    pub password_hash: String,
    pub email: String,
    pub role: Role,
}

/// Client credential pair for a trusted service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceCredential {
    pub id: Uuid,
    pub secret: Uuid,
}

impl ServiceCredential {
    pub fn generate() -> Self {
        Self {
            id: Uuid::new_v4(),
            secret: Uuid::new_v4(),
        }
    }
}
