/// HTTP handlers for the identity service
pub mod accounts;
pub mod health;
pub mod token;

use actix_middleware::{DelegatedAuth, DelegatedVerifier, RolePolicy};
use actix_web::web;
use event_schema::Role;
use std::sync::Arc;

/// Route table. Shared state (`Arc<TokenIssuer>`, `Arc<AccountService>`,
/// `Arc<DelegatedVerifier>`) must be registered as app data by the caller.
pub fn routes(verifier: Arc<DelegatedVerifier>) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg: &mut web::ServiceConfig| {
        cfg.route("/token", web::post().to(token::issue_token))
            .route("/verify", web::post().to(token::verify_token))
            .service(
                web::resource("/services")
                    .route(web::post().to(token::register_service))
                    .route(web::get().to(token::list_services)),
            )
            .service(
                web::resource("/v1/accounts")
                    .route(web::post().to(accounts::create_account))
                    .route(web::get().to(accounts::list_accounts)),
            )
            .service(
                web::resource("/v1/accounts/{pid}")
                    .wrap(DelegatedAuth::new(verifier, RolePolicy::only(Role::Admin)))
                    .route(web::put().to(accounts::update_account))
                    .route(web::delete().to(accounts::delete_account)),
            )
            .route("/health", web::get().to(health::health))
            .route("/metrics", web::get().to(health::metrics));
    }
}
