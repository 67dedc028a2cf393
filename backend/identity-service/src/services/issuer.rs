/// Token issuer: service trust gate, login, and verification
use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::{AccountRepository, ServiceRepository};
use crate::error::{IdentityError, Result};
use crate::models::ServiceCredential;
use crate::security::{verify_password, Clock, TokenRejection, TokenSigner};

/// Proof that a calling service presented a registered credential pair.
///
/// Only [`TokenIssuer::authenticate_service`] produces one, so `login` cannot
/// be reached without passing the service check first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceIdentity {
    client_id: Uuid,
}

impl ServiceIdentity {
    pub(crate) fn new(client_id: Uuid) -> Self {
        Self { client_id }
    }

    pub fn client_id(&self) -> Uuid {
        self.client_id
    }
}

pub struct TokenIssuer {
    accounts: Arc<dyn AccountRepository>,
    services: Arc<dyn ServiceRepository>,
    signer: TokenSigner,
    clock: Arc<dyn Clock>,
}

impl TokenIssuer {
    pub fn new(
        accounts: Arc<dyn AccountRepository>,
        services: Arc<dyn ServiceRepository>,
        signer: TokenSigner,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            accounts,
            services,
            signer,
            clock,
        }
    }

    /// Exact match against stored pairs.
    ///
    /// Missing fields, values that are not UUIDs, an unknown id, and a wrong
    /// secret all produce the same `ServiceAccessDenied`.
    pub async fn authenticate_service(
        &self,
        client_id: Option<&str>,
        client_secret: Option<&str>,
    ) -> Result<ServiceIdentity> {
        let (Some(client_id), Some(client_secret)) = (client_id, client_secret) else {
            debug!("Service credentials missing");
            return Err(IdentityError::ServiceAccessDenied);
        };
        let (Ok(client_id), Ok(client_secret)) =
            (Uuid::parse_str(client_id), Uuid::parse_str(client_secret))
        else {
            debug!("Service credentials are not UUIDs");
            return Err(IdentityError::ServiceAccessDenied);
        };

        match self.services.find(client_id, client_secret).await? {
            Some(credential) => Ok(ServiceIdentity::new(credential.id)),
            None => {
                warn!(client_id = %client_id, "Service authentication failed");
                Err(IdentityError::ServiceAccessDenied)
            }
        }
    }

    /// Check a human credential and mint a token for the account.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        service: &ServiceIdentity,
    ) -> Result<String> {
        let Some(account) = self.accounts.find_by_username(username).await? else {
            info!(client_id = %service.client_id(), "Login failed: unknown username");
            return Err(IdentityError::InvalidCredentials);
        };

        if !verify_password(password, &account.password_hash)? {
            info!(
                client_id = %service.client_id(),
                pid = %account.pid,
                "Login failed: wrong password"
            );
            return Err(IdentityError::InvalidCredentials);
        }

        let token = self.signer.sign(account.pid, self.clock.now())?;
        info!(client_id = %service.client_id(), pid = %account.pid, "Token issued");
        Ok(token)
    }

    /// Signature, then expiry against the injected clock, then the subject.
    pub async fn verify(&self, token: &str) -> Result<Uuid> {
        let claims = self.signer.decode(token)?;

        if claims.exp <= self.clock.now().timestamp() {
            return Err(TokenRejection::Expired.into());
        }

        let pid = Uuid::parse_str(&claims.sub).map_err(|_| TokenRejection::UnknownSubject)?;
        if self.accounts.find_by_pid(pid).await?.is_none() {
            return Err(TokenRejection::UnknownSubject.into());
        }

        Ok(pid)
    }

    /// Each call mints a new pair.
    pub async fn register_service(&self) -> Result<ServiceCredential> {
        let credential = ServiceCredential::generate();
        self.services.insert(&credential).await?;
        info!(client_id = %credential.id, "Service registered");
        Ok(credential)
    }

    pub async fn list_services(&self) -> Result<Vec<ServiceCredential>> {
        self.services.list().await
    }
}
