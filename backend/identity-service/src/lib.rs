/// Identity Service Library
///
/// Token issuer and identity source of truth for the task tracker.
///
/// ## Modules
///
/// - `config`: Service configuration
/// - `db`: Database repositories (accounts, trusted services)
/// - `error`: Error types
/// - `handlers`: HTTP endpoints
/// - `models`: Data models
/// - `security`: Password hashing, token signing, clocks
/// - `services`: Issuer and account administration
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod security;
pub mod services;

use actix_middleware::{AuthMetrics, DelegatedVerifier};
use actix_web::web;
use std::sync::Arc;
use std::time::Duration;

use crate::db::{AccountRepository, ServiceRepository};
use crate::security::{Clock, TokenSigner};
use crate::services::{AccountDirectory, AccountService, LocalIssuerClient, TokenIssuer};

// Re-export commonly used types
pub use error::{IdentityError, Result};

/// Upper bound on the in-process verify call
const LOCAL_VERIFY_TIMEOUT: Duration = Duration::from_secs(2);

/// Wired application services, shared across HTTP workers.
#[derive(Clone)]
pub struct IdentityApp {
    pub issuer: Arc<TokenIssuer>,
    pub accounts: Arc<AccountService>,
    pub verifier: Arc<DelegatedVerifier>,
}

impl IdentityApp {
    pub fn new(
        account_repo: Arc<dyn AccountRepository>,
        service_repo: Arc<dyn ServiceRepository>,
        signer: TokenSigner,
        clock: Arc<dyn Clock>,
        auth_metrics: Option<AuthMetrics>,
    ) -> Self {
        let issuer = Arc::new(TokenIssuer::new(
            account_repo.clone(),
            service_repo,
            signer,
            clock,
        ));
        let accounts = Arc::new(AccountService::new(account_repo));

        let mut verifier = DelegatedVerifier::new(
            Arc::new(LocalIssuerClient::new(issuer.clone())),
            Arc::new(AccountDirectory::new(accounts.clone())),
            LOCAL_VERIFY_TIMEOUT,
        );
        if let Some(metrics) = auth_metrics {
            verifier = verifier.with_metrics(metrics);
        }

        Self {
            issuer,
            accounts,
            verifier: Arc::new(verifier),
        }
    }

    /// App data plus the route table, for `App::configure`.
    pub fn configure(&self) -> impl FnOnce(&mut web::ServiceConfig) {
        let app = self.clone();
        move |cfg: &mut web::ServiceConfig| {
            cfg.app_data(web::Data::new(app.issuer.clone()))
                .app_data(web::Data::new(app.accounts.clone()))
                .app_data(web::Data::new(app.verifier.clone()));
            handlers::routes(app.verifier)(cfg);
        }
    }
}
