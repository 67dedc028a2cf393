//! In-process adapters so the issuer guards its own admin routes with the
//! same delegated verifier the resource services use.

use std::sync::Arc;

use actix_middleware::{
    AccessToken, DirectoryError, IdentityDirectory, IssuerClient, IssuerError, TokenRequest,
};
use async_trait::async_trait;
use event_schema::Role;
use uuid::Uuid;

use crate::error::IdentityError;
use crate::services::{AccountService, TokenIssuer};

fn issuer_error(err: IdentityError) -> IssuerError {
    match err {
        IdentityError::ServiceAccessDenied => IssuerError::Rejected(403),
        IdentityError::InvalidCredentials | IdentityError::TokenRejected(_) => {
            IssuerError::Rejected(401)
        }
        other => IssuerError::Unavailable(other.to_string()),
    }
}

pub struct LocalIssuerClient {
    issuer: Arc<TokenIssuer>,
}

impl LocalIssuerClient {
    pub fn new(issuer: Arc<TokenIssuer>) -> Self {
        Self { issuer }
    }
}

#[async_trait]
impl IssuerClient for LocalIssuerClient {
    async fn verify(&self, token: &str) -> Result<(), IssuerError> {
        self.issuer.verify(token).await.map(|_| ()).map_err(issuer_error)
    }

    async fn request_token(&self, request: &TokenRequest) -> Result<AccessToken, IssuerError> {
        let service = self
            .issuer
            .authenticate_service(Some(&request.client_id), Some(&request.client_secret))
            .await
            .map_err(issuer_error)?;
        let access_token = self
            .issuer
            .login(&request.username, &request.password, &service)
            .await
            .map_err(issuer_error)?;

        Ok(AccessToken {
            access_token,
            token_type: "bearer".to_string(),
        })
    }
}

/// The issuer's own account table, seen as an identity directory.
pub struct AccountDirectory {
    accounts: Arc<AccountService>,
}

impl AccountDirectory {
    pub fn new(accounts: Arc<AccountService>) -> Self {
        Self { accounts }
    }
}

#[async_trait]
impl IdentityDirectory for AccountDirectory {
    async fn role_of(&self, pid: Uuid) -> Result<Option<Role>, DirectoryError> {
        self.accounts
            .role_of(pid)
            .await
            .map_err(|e| DirectoryError(e.to_string()))
    }
}
