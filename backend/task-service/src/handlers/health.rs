use actix_web::{web, HttpResponse};
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;

use crate::consumers::{ConsumerHealth, ConsumerState};
use crate::db::ReplicaStore;

/// What `/health` looks at.
#[derive(Clone)]
pub struct HealthProbe {
    pub replica: Arc<dyn ReplicaStore>,
    pub consumer: ConsumerHealth,
}

/// GET /health
pub async fn health(probe: web::Data<HealthProbe>) -> HttpResponse {
    let consumer = probe.consumer.snapshot();
    let database_ok = match probe.replica.ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed");
            false
        }
    };

    let healthy = database_ok && consumer.state != ConsumerState::Stopped;
    let status = if healthy { "ok" } else { "unavailable" };
    let database = if database_ok { "ok" } else { "unreachable" };
    let body = serde_json::json!({
        "status": status,
        "database": database,
        "identity_consumer": consumer,
    });

    if healthy {
        HttpResponse::Ok().json(body)
    } else {
        HttpResponse::ServiceUnavailable().json(body)
    }
}

/// GET /metrics
pub async fn metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return HttpResponse::InternalServerError().finish();
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}
