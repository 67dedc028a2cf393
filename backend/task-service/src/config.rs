//! Configuration for the task service
//!
//! Loaded once in `main` from the environment (plus `.env` in debug builds).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use transactional_outbox::OutboxConfig;

use crate::services::AssigneePolicy;

#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub kafka: KafkaSettings,
    pub auth: AuthSettings,
    pub tasks: TaskSettings,
    pub outbox: OutboxSettings,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        if cfg!(debug_assertions) {
            dotenvy::dotenv().ok();
        }

        Ok(Settings {
            server: ServerSettings::from_env()?,
            database: DatabaseSettings::from_env()?,
            kafka: KafkaSettings::from_env()?,
            auth: AuthSettings::from_env()?,
            tasks: TaskSettings::from_env()?,
            outbox: OutboxSettings::from_env()?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl ServerSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .context("Invalid SERVER_PORT")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
}

impl DatabaseSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .context("Invalid DATABASE_MAX_CONNECTIONS")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KafkaSettings {
    pub brokers: String,
    pub group_id: String,
    pub identity_topic: String,
    pub poll_timeout_ms: u64,
}

impl KafkaSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            brokers: env::var("KAFKA_BROKERS").context("KAFKA_BROKERS must be set")?,
            group_id: env::var("KAFKA_GROUP_ID").unwrap_or_else(|_| "task-service".to_string()),
            identity_topic: env::var("KAFKA_IDENTITY_TOPIC")
                .unwrap_or_else(|_| event_schema::topics::IDENTITY_CHANGES.to_string()),
            poll_timeout_ms: env::var("KAFKA_POLL_TIMEOUT_MS")
                .unwrap_or_else(|_| "10000".to_string())
                .parse()
                .context("Invalid KAFKA_POLL_TIMEOUT_MS")?,
        })
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

/// Where and how to reach the issuer.
#[derive(Clone)]
pub struct AuthSettings {
    pub verify_url: String,
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub timeout_ms: u64,
}

impl std::fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSettings")
            .field("verify_url", &self.verify_url)
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

impl AuthSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            verify_url: env::var("AUTH_VERIFY_URL")
                .unwrap_or_else(|_| "http://localhost:5555/verify".to_string()),
            token_url: env::var("AUTH_TOKEN_URL")
                .unwrap_or_else(|_| "http://localhost:5555/token".to_string()),
            client_id: env::var("AUTH_CLIENT_ID").context("AUTH_CLIENT_ID must be set")?,
            client_secret: env::var("AUTH_CLIENT_SECRET")
                .context("AUTH_CLIENT_SECRET must be set")?,
            timeout_ms: env::var("AUTH_TIMEOUT_MS")
                .unwrap_or_else(|_| "2000".to_string())
                .parse()
                .context("Invalid AUTH_TIMEOUT_MS")?,
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TaskSettings {
    pub assignee_policy: AssigneePolicy,
}

impl TaskSettings {
    fn from_env() -> Result<Self> {
        let raw = env::var("TASK_ASSIGNEE_POLICY").unwrap_or_else(|_| "any".to_string());
        Ok(Self {
            assignee_policy: AssigneePolicy::from_str(&raw)
                .with_context(|| format!("Invalid TASK_ASSIGNEE_POLICY: {}", raw))?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxSettings {
    pub batch_size: i64,
    pub poll_interval_ms: u64,
    pub max_retries: i32,
}

impl OutboxSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            batch_size: env::var("OUTBOX_BATCH_SIZE")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .context("Invalid OUTBOX_BATCH_SIZE")?,
            poll_interval_ms: env::var("OUTBOX_POLL_INTERVAL_MS")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .context("Invalid OUTBOX_POLL_INTERVAL_MS")?,
            max_retries: env::var("OUTBOX_MAX_RETRIES")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .context("Invalid OUTBOX_MAX_RETRIES")?,
        })
    }

    pub fn relay_config(&self) -> OutboxConfig {
        OutboxConfig {
            batch_size: self.batch_size,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            max_retries: self.max_retries,
            ..OutboxConfig::default()
        }
    }
}
