//! # Actix Middleware Library
//!
//! Delegated authorization for Popug resource services
//!
//! ## Modules
//! - `issuer_client`: HTTP client for the issuer's `/verify` and `/token`
//! - `verifier`: remote verify, replica lookup, role check
//! - `policy`: role policies for guarded routes
//! - `delegated_auth`: actix middleware and `Principal` extractor
//! - `metrics`: decision counters

pub mod delegated_auth;
pub mod issuer_client;
pub mod metrics;
pub mod policy;
pub mod verifier;

pub use delegated_auth::{bearer_token, DelegatedAuth};
pub use issuer_client::{AccessToken, HttpIssuerClient, IssuerClient, IssuerError, TokenRequest};
pub use metrics::AuthMetrics;
pub use policy::RolePolicy;
pub use verifier::{
    AuthError, DelegatedVerifier, DirectoryError, IdentityDirectory, Principal, VerifiedToken,
};
