use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;

use crate::security::TokenRejection;

pub type Result<T> = std::result::Result<T, IdentityError>;

#[derive(Debug, Error)]
pub enum IdentityError {
    /// Same answer for unknown id, wrong secret, or missing credentials
    #[error("access denied")]
    ServiceAccessDenied,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("token rejected: {0}")]
    TokenRejected(TokenRejection),

    #[error("account not found")]
    AccountNotFound,

    #[error("username already exists")]
    UsernameTaken,

    #[error("an account cannot delete itself")]
    SelfDeletion,

    #[error("validation error: {0}")]
    Validation(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("outbox error: {0}")]
    Outbox(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for IdentityError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {}", err);
        IdentityError::Database(err.to_string())
    }
}

impl From<transactional_outbox::OutboxError> for IdentityError {
    fn from(err: transactional_outbox::OutboxError) -> Self {
        tracing::error!("Outbox error: {}", err);
        IdentityError::Outbox(err.to_string())
    }
}

impl From<validator::ValidationErrors> for IdentityError {
    fn from(err: validator::ValidationErrors) -> Self {
        IdentityError::Validation(err.to_string())
    }
}

impl From<TokenRejection> for IdentityError {
    fn from(rejection: TokenRejection) -> Self {
        IdentityError::TokenRejected(rejection)
    }
}

impl ResponseError for IdentityError {
    fn status_code(&self) -> StatusCode {
        match self {
            IdentityError::ServiceAccessDenied => StatusCode::FORBIDDEN,
            IdentityError::InvalidCredentials | IdentityError::TokenRejected(_) => {
                StatusCode::UNAUTHORIZED
            }
            IdentityError::AccountNotFound => StatusCode::NOT_FOUND,
            IdentityError::UsernameTaken | IdentityError::SelfDeletion => StatusCode::CONFLICT,
            IdentityError::Validation(_) => StatusCode::BAD_REQUEST,
            IdentityError::Database(_) | IdentityError::Outbox(_) | IdentityError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let message = match status {
            // Storage details stay in the logs
            StatusCode::INTERNAL_SERVER_ERROR => "internal server error".to_string(),
            _ => self.to_string(),
        };

        let mut builder = HttpResponse::build(status);
        if matches!(self, IdentityError::TokenRejected(_)) {
            builder.insert_header(("WWW-Authenticate", "Bearer"));
        }
        builder.json(serde_json::json!({
            "error": message,
            "status": status.as_u16(),
        }))
    }
}
