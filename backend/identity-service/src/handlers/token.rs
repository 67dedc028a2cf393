/// Token issuance, verification and service credential handlers
use actix_middleware::bearer_token;
use actix_web::{web, Either, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{IdentityError, Result};
use crate::services::TokenIssuer;

/// Accepted as JSON or as an OAuth2-style form
#[derive(Debug, Default, Deserialize)]
pub struct TokenForm {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
}

/// Issue an access token
///
/// POST /token
pub async fn issue_token(
    issuer: web::Data<Arc<TokenIssuer>>,
    body: Either<web::Json<TokenForm>, web::Form<TokenForm>>,
) -> Result<HttpResponse> {
    let form = match body {
        Either::Left(json) => json.into_inner(),
        Either::Right(form) => form.into_inner(),
    };

    let service = issuer
        .authenticate_service(form.client_id.as_deref(), form.client_secret.as_deref())
        .await?;

    let (Some(username), Some(password)) = (form.username, form.password) else {
        return Err(IdentityError::InvalidCredentials);
    };
    let access_token = issuer.login(&username, &password, &service).await?;

    Ok(HttpResponse::Ok().json(TokenResponse {
        access_token,
        token_type: "bearer",
    }))
}

/// Check a bearer token; 200 or 401, no body either way
///
/// POST /verify
pub async fn verify_token(
    issuer: web::Data<Arc<TokenIssuer>>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let Ok(token) = bearer_token(req.headers()) else {
        return Ok(unauthorized());
    };

    match issuer.verify(&token).await {
        Ok(_) => Ok(HttpResponse::Ok().finish()),
        Err(IdentityError::TokenRejected(reason)) => {
            tracing::debug!(reason = %reason, "Token rejected");
            Ok(unauthorized())
        }
        Err(e) => Err(e),
    }
}

fn unauthorized() -> HttpResponse {
    HttpResponse::Unauthorized()
        .insert_header(("WWW-Authenticate", "Bearer"))
        .finish()
}

/// Register a trusted service
///
/// POST /services
pub async fn register_service(issuer: web::Data<Arc<TokenIssuer>>) -> Result<HttpResponse> {
    let credential = issuer.register_service().await?;
    Ok(HttpResponse::Created().json(credential))
}

/// List registered services
///
/// GET /services
pub async fn list_services(issuer: web::Data<Arc<TokenIssuer>>) -> Result<HttpResponse> {
    let credentials = issuer.list_services().await?;
    Ok(HttpResponse::Ok().json(credentials))
}
