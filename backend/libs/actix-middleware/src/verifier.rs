//! Delegated verification: the resource service never holds the signing
//! secret. It asks the issuer whether a token is good, and only then reads the
//! subject and looks it up in its local identity replica.

use std::sync::Arc;
use std::time::Duration;

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use async_trait::async_trait;
use event_schema::Role;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use resilience::{call_with_timeout, CallError};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::issuer_client::{IssuerClient, IssuerError};
use crate::metrics::AuthMetrics;
use crate::policy::RolePolicy;

/// The caller of an authorized request, as known to the local replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub pid: Uuid,
    pub role: Role,
}

impl Principal {
    /// Route-level role check for handlers that mix policies on one path.
    pub fn require(&self, policy: &RolePolicy) -> Result<(), AuthError> {
        if policy.allows(self.role) {
            Ok(())
        } else {
            Err(AuthError::Forbidden { role: self.role })
        }
    }
}

#[derive(Debug, Error)]
#[error("identity directory unavailable: {0}")]
pub struct DirectoryError(pub String);

/// Local read model of identities, keyed by pid.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    async fn role_of(&self, pid: Uuid) -> Result<Option<Role>, DirectoryError>;
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing or malformed Authorization header")]
    MissingToken,

    #[error("token rejected by issuer")]
    TokenInvalid,

    /// Fail-closed: an issuer we cannot reach never lets a request through
    #[error("issuer unavailable: {0}")]
    IssuerUnavailable(String),

    /// The account exists upstream but its create event has not arrived yet
    #[error("account {pid} not found")]
    ReplicaLag { pid: Uuid },

    #[error("role {role} is not allowed here")]
    Forbidden { role: Role },

    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

impl AuthError {
    /// Label for logs and the decision counter
    pub fn outcome(&self) -> &'static str {
        match self {
            AuthError::MissingToken | AuthError::TokenInvalid => "token_invalid",
            AuthError::IssuerUnavailable(_) => "issuer_unavailable",
            AuthError::ReplicaLag { .. } => "replica_lag",
            AuthError::Forbidden { .. } => "forbidden",
            AuthError::Directory(_) => "directory_error",
        }
    }
}

impl ResponseError for AuthError {
    fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingToken | AuthError::TokenInvalid | AuthError::IssuerUnavailable(_) => {
                StatusCode::UNAUTHORIZED
            }
            AuthError::ReplicaLag { .. } => StatusCode::NOT_FOUND,
            AuthError::Forbidden { .. } => StatusCode::FORBIDDEN,
            AuthError::Directory(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let mut builder = HttpResponse::build(status);
        if status == StatusCode::UNAUTHORIZED {
            builder.insert_header(("WWW-Authenticate", "Bearer"));
        }
        builder.json(serde_json::json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        }))
    }
}

#[derive(Debug, Deserialize)]
struct SubjectClaim {
    sub: String,
}

/// A token the issuer has confirmed.
///
/// Only [`DelegatedVerifier::confirm`] builds one, so claims cannot be read
/// from a token that has not been through the issuer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifiedToken {
    subject: Uuid,
}

impl VerifiedToken {
    fn read_confirmed(token: &str) -> Result<Self, AuthError> {
        // Signature and expiry were checked by the issuer
        let mut validation = Validation::new(Algorithm::HS256);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        let data = decode::<SubjectClaim>(token, &DecodingKey::from_secret(&[]), &validation)
            .map_err(|_| AuthError::TokenInvalid)?;
        let subject = Uuid::parse_str(&data.claims.sub).map_err(|_| AuthError::TokenInvalid)?;
        Ok(Self { subject })
    }

    pub fn subject(&self) -> Uuid {
        self.subject
    }
}

pub struct DelegatedVerifier {
    issuer: Arc<dyn IssuerClient>,
    directory: Arc<dyn IdentityDirectory>,
    timeout: Duration,
    metrics: Option<AuthMetrics>,
}

impl DelegatedVerifier {
    pub fn new(
        issuer: Arc<dyn IssuerClient>,
        directory: Arc<dyn IdentityDirectory>,
        timeout: Duration,
    ) -> Self {
        Self {
            issuer,
            directory,
            timeout,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: AuthMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Ask the issuer about `token`, bounded by the configured timeout.
    pub async fn confirm(&self, token: &str) -> Result<VerifiedToken, AuthError> {
        match call_with_timeout(self.timeout, self.issuer.verify(token)).await {
            Ok(()) => VerifiedToken::read_confirmed(token),
            Err(CallError::Failed(IssuerError::Rejected(_))) => Err(AuthError::TokenInvalid),
            Err(CallError::Failed(IssuerError::Unavailable(reason))) => {
                Err(AuthError::IssuerUnavailable(reason))
            }
            Err(CallError::TimedOut(after)) => Err(AuthError::IssuerUnavailable(format!(
                "verify timed out after {:?}",
                after
            ))),
        }
    }

    /// Full decision: remote verify, replica lookup, role policy.
    pub async fn authorize(&self, token: &str, policy: &RolePolicy) -> Result<Principal, AuthError> {
        let decision = self.decide(token, policy).await;

        let outcome = match &decision {
            Ok(principal) => {
                debug!(pid = %principal.pid, role = %principal.role, "Request authorized");
                "allowed"
            }
            Err(e) => {
                match e {
                    AuthError::ReplicaLag { pid } => {
                        warn!(pid = %pid, reason = "replica_lag", "Verified account missing from replica")
                    }
                    AuthError::IssuerUnavailable(detail) => {
                        warn!(reason = "issuer_unavailable", detail = %detail, "Rejecting request, issuer unreachable")
                    }
                    AuthError::Directory(err) => {
                        warn!(reason = "directory_error", error = %err, "Identity replica lookup failed")
                    }
                    other => debug!(reason = other.outcome(), "Request rejected"),
                }
                e.outcome()
            }
        };
        if let Some(metrics) = &self.metrics {
            metrics.record(outcome);
        }

        decision
    }

    async fn decide(&self, token: &str, policy: &RolePolicy) -> Result<Principal, AuthError> {
        let verified = self.confirm(token).await?;
        let pid = verified.subject();

        let role = self
            .directory
            .role_of(pid)
            .await?
            .ok_or(AuthError::ReplicaLag { pid })?;

        let principal = Principal { pid, role };
        principal.require(policy)?;
        Ok(principal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issuer_client::MockIssuerClient;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde::Serialize;

    #[derive(Serialize)]
    struct Claims {
        sub: String,
        exp: i64,
    }

    fn token_for(pid: Uuid) -> String {
        encode(
            &Header::default(),
            &Claims {
                sub: pid.to_string(),
                exp: 4_000_000_000,
            },
            &EncodingKey::from_secret(b"issuer-only-secret"),
        )
        .unwrap()
    }

    fn directory_with(pid: Uuid, role: Option<Role>) -> MockIdentityDirectory {
        let mut directory = MockIdentityDirectory::new();
        directory
            .expect_role_of()
            .withf(move |p| *p == pid)
            .returning(move |_| Ok(role));
        directory
    }

    fn verifier(issuer: MockIssuerClient, directory: MockIdentityDirectory) -> DelegatedVerifier {
        DelegatedVerifier::new(
            Arc::new(issuer),
            Arc::new(directory),
            Duration::from_millis(100),
        )
    }

    #[tokio::test]
    async fn test_allows_admin() {
        let pid = Uuid::new_v4();
        let mut issuer = MockIssuerClient::new();
        issuer.expect_verify().times(1).returning(|_| Ok(()));

        let principal = verifier(issuer, directory_with(pid, Some(Role::Admin)))
            .authorize(&token_for(pid), &RolePolicy::only(Role::Admin))
            .await
            .unwrap();

        assert_eq!(principal, Principal { pid, role: Role::Admin });
    }

    #[tokio::test]
    async fn test_rejected_token_never_reaches_replica() {
        let mut issuer = MockIssuerClient::new();
        issuer
            .expect_verify()
            .returning(|_| Err(IssuerError::Rejected(401)));
        let mut directory = MockIdentityDirectory::new();
        directory.expect_role_of().never();

        let err = verifier(issuer, directory)
            .authorize(&token_for(Uuid::new_v4()), &RolePolicy::any_authenticated())
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::TokenInvalid));
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_transport_error_fails_closed() {
        let mut issuer = MockIssuerClient::new();
        issuer
            .expect_verify()
            .returning(|_| Err(IssuerError::Unavailable("connection refused".to_string())));
        let mut directory = MockIdentityDirectory::new();
        directory.expect_role_of().never();

        let err = verifier(issuer, directory)
            .authorize(&token_for(Uuid::new_v4()), &RolePolicy::any_authenticated())
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::IssuerUnavailable(_)));
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
    }

    struct HangingIssuer;

    #[async_trait]
    impl IssuerClient for HangingIssuer {
        async fn verify(&self, _token: &str) -> Result<(), IssuerError> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        }

        async fn request_token(
            &self,
            _request: &crate::issuer_client::TokenRequest,
        ) -> Result<crate::issuer_client::AccessToken, IssuerError> {
            Err(IssuerError::Unavailable("unused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_slow_issuer_fails_closed() {
        let pid = Uuid::new_v4();
        let verifier = DelegatedVerifier::new(
            Arc::new(HangingIssuer),
            Arc::new(directory_with(pid, Some(Role::Admin))),
            Duration::from_millis(20),
        );

        let err = verifier
            .authorize(&token_for(pid), &RolePolicy::any_authenticated())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::IssuerUnavailable(_)));
    }

    #[tokio::test]
    async fn test_replica_miss_is_replica_lag() {
        let pid = Uuid::new_v4();
        let mut issuer = MockIssuerClient::new();
        issuer.expect_verify().returning(|_| Ok(()));

        let err = verifier(issuer, directory_with(pid, None))
            .authorize(&token_for(pid), &RolePolicy::any_authenticated())
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::ReplicaLag { pid: p } if p == pid));
        assert_eq!(err.outcome(), "replica_lag");
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_insufficient_role_is_forbidden() {
        let pid = Uuid::new_v4();
        let mut issuer = MockIssuerClient::new();
        issuer.expect_verify().returning(|_| Ok(()));

        let err = verifier(issuer, directory_with(pid, Some(Role::Worker)))
            .authorize(&token_for(pid), &RolePolicy::only(Role::Admin))
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::Forbidden { role: Role::Worker }));
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_confirmed_garbage_token_is_invalid() {
        let mut issuer = MockIssuerClient::new();
        issuer.expect_verify().returning(|_| Ok(()));

        let err = verifier(issuer, MockIdentityDirectory::new())
            .confirm("not-a-jwt")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::TokenInvalid));
    }
}
