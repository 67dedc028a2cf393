/// Task Service Library
///
/// Resource service of the task tracker. Authorizes every request by asking
/// identity-service about the token, then checking the caller's role in a
/// local replica of identities fed from Kafka.
///
/// ## Modules
///
/// - `config`: Service configuration
/// - `consumers`: Identity replica consumer
/// - `db`: Database repositories (replica, tasks)
/// - `error`: Error types
/// - `handlers`: HTTP endpoints
/// - `metrics`: Prometheus counters
/// - `models`: Data models
/// - `services`: Task workflow
pub mod config;
pub mod consumers;
pub mod db;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod services;

use actix_middleware::{AuthMetrics, DelegatedVerifier, IssuerClient};
use actix_web::web;
use std::sync::Arc;
use std::time::Duration;

use crate::consumers::ConsumerHealth;
use crate::db::{ReplicaDirectory, ReplicaStore, TaskRepository};
use crate::handlers::{ClientCredentials, HealthProbe};
use crate::services::{AssigneePolicy, TaskService};

// Re-export commonly used types
pub use error::{AppError, Result};

#[derive(Debug, Clone)]
pub struct TaskAppSettings {
    pub assignee_policy: AssigneePolicy,
    pub credentials: ClientCredentials,
    /// Upper bound on each call to the issuer's verify endpoint
    pub verify_timeout: Duration,
}

/// Wired application services, shared across HTTP workers.
#[derive(Clone)]
pub struct TaskApp {
    pub tasks: Arc<TaskService>,
    pub issuer: Arc<dyn IssuerClient>,
    pub verifier: Arc<DelegatedVerifier>,
    credentials: ClientCredentials,
    probe: HealthProbe,
}

impl TaskApp {
    pub fn new(
        task_repo: Arc<dyn TaskRepository>,
        replica: Arc<dyn ReplicaStore>,
        issuer: Arc<dyn IssuerClient>,
        consumer: ConsumerHealth,
        settings: TaskAppSettings,
        auth_metrics: Option<AuthMetrics>,
    ) -> Self {
        let tasks = Arc::new(TaskService::new(
            task_repo,
            replica.clone(),
            settings.assignee_policy,
        ));

        let mut verifier = DelegatedVerifier::new(
            issuer.clone(),
            Arc::new(ReplicaDirectory::new(replica.clone())),
            settings.verify_timeout,
        );
        if let Some(metrics) = auth_metrics {
            verifier = verifier.with_metrics(metrics);
        }

        Self {
            tasks,
            issuer,
            verifier: Arc::new(verifier),
            credentials: settings.credentials,
            probe: HealthProbe { replica, consumer },
        }
    }

    /// App data plus the route table, for `App::configure`.
    pub fn configure(&self) -> impl FnOnce(&mut web::ServiceConfig) {
        let app = self.clone();
        move |cfg: &mut web::ServiceConfig| {
            cfg.app_data(web::Data::new(app.tasks.clone()))
                .app_data(web::Data::new(app.issuer.clone()))
                .app_data(web::Data::new(app.credentials.clone()))
                .app_data(web::Data::new(app.probe.clone()));
            handlers::routes(app.verifier)(cfg);
        }
    }
}
