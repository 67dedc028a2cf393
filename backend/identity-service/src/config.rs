//! Configuration for the identity service
//!
//! Built once in `main` from environment variables (plus `.env` in debug
//! builds) and handed to every component that needs a piece of it.
//!
//! # Example
//!
//! ```no_run
//! use identity_service::config::Settings;
//!
//! fn main() -> anyhow::Result<()> {
//!     let settings = Settings::from_env()?;
//!     println!("token lifetime: {}s", settings.jwt.lifetime_seconds);
//!     Ok(())
//! }
//! ```

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use transactional_outbox::OutboxConfig;

/// 30 days
pub const DEFAULT_TOKEN_LIFETIME_SECONDS: i64 = 30 * 24 * 60 * 60;

const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub kafka: KafkaSettings,
    pub jwt: JwtSettings,
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
            jwt: JwtSettings::from_env()?,
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
                .unwrap_or_else(|_| "5555".to_string())
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
}

impl KafkaSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            brokers: env::var("KAFKA_BROKERS").context("KAFKA_BROKERS must be set")?,
        })
    }
}

/// Signing settings. The secret never leaves the issuer.
#[derive(Clone, Serialize, Deserialize)]
pub struct JwtSettings {
    pub secret: String,
    pub lifetime_seconds: i64,
}

impl std::fmt::Debug for JwtSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtSettings")
            .field("secret", &"<redacted>")
            .field("lifetime_seconds", &self.lifetime_seconds)
            .finish()
    }
}

impl JwtSettings {
    fn from_env() -> Result<Self> {
        let secret = env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        if secret.len() < MIN_SECRET_LEN {
            bail!("JWT_SECRET must be at least {} bytes", MIN_SECRET_LEN);
        }

        let lifetime_seconds: i64 = env::var("JWT_LIFETIME_SECONDS")
            .unwrap_or_else(|_| DEFAULT_TOKEN_LIFETIME_SECONDS.to_string())
            .parse()
            .context("Invalid JWT_LIFETIME_SECONDS")?;
        if lifetime_seconds <= 0 {
            bail!("JWT_LIFETIME_SECONDS must be positive");
        }

        Ok(Self {
            secret,
            lifetime_seconds,
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
    pub(crate) fn from_env() -> Result<Self> {
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
