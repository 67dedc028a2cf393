/// Login proxy to the identity issuer
use actix_middleware::{IssuerClient, IssuerError, TokenRequest};
use actix_web::{web, HttpResponse, Result as ActixResult};
use std::sync::Arc;

use crate::error::AppError;
use crate::models::LoginRequest;

/// This service's own client credentials at the issuer.
#[derive(Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// POST /auth
pub async fn login(
    issuer: web::Data<Arc<dyn IssuerClient>>,
    credentials: web::Data<ClientCredentials>,
    body: web::Json<LoginRequest>,
) -> ActixResult<HttpResponse> {
    let body = body.into_inner();
    let request = TokenRequest {
        client_id: credentials.client_id.clone(),
        client_secret: credentials.client_secret.clone(),
        username: body.username,
        password: body.password,
    };

    match issuer.request_token(&request).await {
        Ok(token) => Ok(HttpResponse::Ok().json(token)),
        Err(IssuerError::Rejected(status)) => {
            tracing::debug!(status, "Issuer refused login");
            Err(AppError::Unauthorized("invalid credentials".to_string()).into())
        }
        Err(IssuerError::Unavailable(reason)) => {
            tracing::warn!(%reason, "Issuer unavailable for login");
            Err(AppError::BadGateway("identity service unavailable".to_string()).into())
        }
    }
}
