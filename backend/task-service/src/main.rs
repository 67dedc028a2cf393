/// Task Service Main Entry Point
///
/// Serves the task workflow over HTTP, keeps the identity replica current
/// from Kafka, and relays task events through the outbox.
use actix_middleware::{AuthMetrics, HttpIssuerClient};
use actix_web::{App, HttpServer};
use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use task_service::config::Settings;
use task_service::consumers::{spawn_replica_consumer, ConsumerConfig, KafkaMessageSource};
use task_service::db::{PgReplicaStore, PgTaskRepository, ReplicaStore};
use task_service::handlers::ClientCredentials;
use task_service::metrics::ReplicaMetrics;
use task_service::{TaskApp, TaskAppSettings};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_actix_web::TracingLogger;
use transactional_outbox::{
    create_producer, KafkaOutboxPublisher, OutboxMetrics, OutboxProcessor, SqlxOutboxRepository,
};

const SERVICE_NAME: &str = "task-service";

#[actix_web::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "task_service=info,info".into()),
        )
        .with_target(false)
        .json()
        .init();

    info!("Starting Task Service");

    let settings = Settings::from_env().context("Failed to load configuration")?;
    info!("Configuration loaded successfully");

    let db_pool = PgPoolOptions::new()
        .max_connections(settings.database.max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&settings.database.url)
        .await
        .context("Failed to connect to PostgreSQL")?;

    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .context("Failed to run database migrations")?;
    info!("Database migrations completed");

    let replica: Arc<dyn ReplicaStore> = Arc::new(PgReplicaStore::new(db_pool.clone()));

    // Identity replica consumer
    let source = KafkaMessageSource::new(
        &settings.kafka.brokers,
        &settings.kafka.group_id,
        &settings.kafka.identity_topic,
    )
    .context("Failed to create identity consumer")?;
    let replica_metrics = match ReplicaMetrics::new(SERVICE_NAME) {
        Ok(metrics) => Some(metrics),
        Err(e) => {
            warn!("Replica metrics disabled: {}", e);
            None
        }
    };
    let consumer = spawn_replica_consumer(
        source,
        replica.clone(),
        ConsumerConfig {
            poll_timeout: settings.kafka.poll_timeout(),
            ..ConsumerConfig::default()
        },
        replica_metrics,
    );
    info!("Identity replica consumer started");

    // Outbox relay
    let producer =
        create_producer(&settings.kafka.brokers).context("Failed to create Kafka producer")?;
    let mut relay = OutboxProcessor::new(
        Arc::new(SqlxOutboxRepository::new(db_pool.clone())),
        Arc::new(KafkaOutboxPublisher::new(producer)),
        settings.outbox.relay_config(),
    );
    match OutboxMetrics::new(SERVICE_NAME) {
        Ok(metrics) => relay = relay.with_metrics(metrics),
        Err(e) => warn!("Outbox metrics disabled: {}", e),
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let relay_handle = tokio::spawn(async move { relay.run(shutdown_rx).await });
    info!("Outbox relay started");

    let issuer = HttpIssuerClient::new(
        settings.auth.verify_url.clone(),
        settings.auth.token_url.clone(),
        settings.auth.timeout(),
    )
    .context("Failed to build issuer client")?;

    let auth_metrics = match AuthMetrics::new(SERVICE_NAME) {
        Ok(metrics) => Some(metrics),
        Err(e) => {
            warn!("Auth metrics disabled: {}", e);
            None
        }
    };

    let app = TaskApp::new(
        Arc::new(PgTaskRepository::new(db_pool.clone())),
        replica,
        Arc::new(issuer),
        consumer.health(),
        TaskAppSettings {
            assignee_policy: settings.tasks.assignee_policy,
            credentials: ClientCredentials {
                client_id: settings.auth.client_id.clone(),
                client_secret: settings.auth.client_secret.clone(),
            },
            verify_timeout: settings.auth.timeout(),
        },
        auth_metrics,
    );

    let bind_addr = format!("{}:{}", settings.server.host, settings.server.port);
    info!("HTTP server listening on {}", bind_addr);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .configure(app.configure())
    })
    .bind(&bind_addr)
    .with_context(|| format!("Failed to bind {}", bind_addr))?
    .disable_signals()
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    shutdown_signal().await;

    server_handle.stop(true).await;
    if let Err(e) = server_task.await {
        error!("HTTP server task failed: {}", e);
    }

    consumer.shutdown().await;

    let _ = shutdown_tx.send(true);
    if let Err(e) = relay_handle.await {
        error!("Outbox relay task failed: {}", e);
    }

    db_pool.close().await;
    info!("Task service shutdown complete");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }

    info!("Shutting down gracefully...");
}
