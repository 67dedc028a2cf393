/// HTTP handlers for the task service
pub mod auth;
pub mod health;
pub mod tasks;

use actix_middleware::{DelegatedAuth, DelegatedVerifier, RolePolicy};
use actix_web::web;
use event_schema::Role;
use std::sync::Arc;

pub use auth::ClientCredentials;
pub use health::HealthProbe;

/// Route table. `Arc<TaskService>`, `Arc<dyn IssuerClient>`,
/// `ClientCredentials` and `HealthProbe` must be registered as app data by
/// the caller.
pub fn routes(verifier: Arc<DelegatedVerifier>) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg: &mut web::ServiceConfig| {
        cfg.route("/auth", web::post().to(auth::login))
            .service(
                web::resource("/tasks")
                    .wrap(DelegatedAuth::new(
                        verifier.clone(),
                        RolePolicy::any_authenticated(),
                    ))
                    .route(web::post().to(tasks::create_task))
                    .route(web::get().to(tasks::list_tasks)),
            )
            .service(
                web::resource("/tasks/reshuffle")
                    .wrap(DelegatedAuth::new(verifier.clone(), managers()))
                    .route(web::post().to(tasks::reshuffle_tasks)),
            )
            .service(
                web::resource("/tasks/{pid}/complete")
                    .wrap(DelegatedAuth::new(verifier, RolePolicy::any_authenticated()))
                    .route(web::put().to(tasks::complete_task)),
            )
            .route("/health", web::get().to(health::health))
            .route("/metrics", web::get().to(health::metrics));
    }
}

/// Roles that may create and reshuffle tasks
pub fn managers() -> RolePolicy {
    RolePolicy::any_of([Role::Admin, Role::Manager])
}
