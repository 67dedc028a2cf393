use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IssuerError {
    /// The issuer answered and said no
    #[error("issuer rejected the request ({0})")]
    Rejected(u16),

    /// No usable answer: transport error, timeout, or unexpected status
    #[error("issuer unavailable: {0}")]
    Unavailable(String),
}

/// Body of the issuer's `/token` endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRequest {
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    #[serde(default = "bearer")]
    pub token_type: String,
}

fn bearer() -> String {
    "bearer".to_string()
}

/// Remote side of delegated verification.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IssuerClient: Send + Sync {
    /// Ok when the issuer accepts the token as signed, unexpired, and
    /// belonging to an existing account.
    async fn verify(&self, token: &str) -> Result<(), IssuerError>;

    async fn request_token(&self, request: &TokenRequest) -> Result<AccessToken, IssuerError>;
}

pub struct HttpIssuerClient {
    http: reqwest::Client,
    verify_url: String,
    token_url: String,
}

impl HttpIssuerClient {
    pub fn new(
        verify_url: impl Into<String>,
        token_url: impl Into<String>,
        timeout: Duration,
    ) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            verify_url: verify_url.into(),
            token_url: token_url.into(),
        })
    }
}

fn unavailable(err: reqwest::Error) -> IssuerError {
    IssuerError::Unavailable(err.to_string())
}

#[async_trait]
impl IssuerClient for HttpIssuerClient {
    async fn verify(&self, token: &str) -> Result<(), IssuerError> {
        let response = self
            .http
            .post(&self.verify_url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(unavailable)?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::UNAUTHORIZED => Err(IssuerError::Rejected(401)),
            other => Err(IssuerError::Unavailable(format!(
                "unexpected verify status {}",
                other
            ))),
        }
    }

    async fn request_token(&self, request: &TokenRequest) -> Result<AccessToken, IssuerError> {
        let response = self
            .http
            .post(&self.token_url)
            .json(request)
            .send()
            .await
            .map_err(unavailable)?;

        match response.status() {
            StatusCode::OK => response.json::<AccessToken>().await.map_err(unavailable),
            status @ (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) => {
                Err(IssuerError::Rejected(status.as_u16()))
            }
            other => Err(IssuerError::Unavailable(format!(
                "unexpected token status {}",
                other
            ))),
        }
    }
}
