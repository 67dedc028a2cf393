/// Identity Service Main Entry Point
///
/// Serves token issuance, verification and account administration over HTTP,
/// and runs the outbox relay that publishes identity events to Kafka.
use actix_middleware::AuthMetrics;
use actix_web::{App, HttpServer};
use anyhow::{Context, Result};
use identity_service::config::Settings;
use identity_service::db::{PgAccountRepository, PgServiceRepository};
use identity_service::security::{SystemClock, TokenSigner};
use identity_service::IdentityApp;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_actix_web::TracingLogger;
use transactional_outbox::{
    create_producer, KafkaOutboxPublisher, OutboxMetrics, OutboxProcessor, SqlxOutboxRepository,
};

const SERVICE_NAME: &str = "identity-service";

#[actix_web::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "identity_service=info,info".into()),
        )
        .with_target(false)
        .json()
        .init();

    info!("Starting Identity Service");

    // Load configuration
    let settings = Settings::from_env().context("Failed to load configuration")?;
    info!("Configuration loaded successfully");

    // Initialize database connection pool
    let db_pool = PgPoolOptions::new()
        .max_connections(settings.database.max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&settings.database.url)
        .await
        .context("Failed to connect to PostgreSQL")?;

    info!(
        "Database pool initialized with {} max connections",
        settings.database.max_connections
    );

    // Run database migrations
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .context("Failed to run database migrations")?;
    info!("Database migrations completed");

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

    let auth_metrics = match AuthMetrics::new(SERVICE_NAME) {
        Ok(metrics) => Some(metrics),
        Err(e) => {
            warn!("Auth metrics disabled: {}", e);
            None
        }
    };

    let app = IdentityApp::new(
        Arc::new(PgAccountRepository::new(db_pool.clone())),
        Arc::new(PgServiceRepository::new(db_pool.clone())),
        TokenSigner::new(
            settings.jwt.secret.as_bytes(),
            chrono::Duration::seconds(settings.jwt.lifetime_seconds),
        ),
        Arc::new(SystemClock),
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

    let _ = shutdown_tx.send(true);
    if let Err(e) = relay_handle.await {
        error!("Outbox relay task failed: {}", e);
    }

    db_pool.close().await;
    info!("Identity service shutdown complete");

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
