use prometheus::{IntCounter, IntGauge, Opts};
use tracing::warn;

#[derive(Clone)]
pub struct OutboxMetrics {
    pub pending: IntGauge,
    pub oldest_pending_age_seconds: IntGauge,
    pub published: IntCounter,
    pub failed: IntCounter,
}

impl OutboxMetrics {
    /// Build the relay metrics and register them on the default registry.
    ///
    /// A metric that is already registered (a second relay in the same
    /// process) is logged and left unregistered.
    pub fn new(service: &str) -> prometheus::Result<Self> {
        let opts = |name: &str, help: &str| {
            Opts::new(name, help).const_label("service", service.to_string())
        };

        let pending = IntGauge::with_opts(opts(
            "outbox_pending_count",
            "Number of unpublished outbox events currently pending",
        ))?;
        let oldest_pending_age_seconds = IntGauge::with_opts(opts(
            "outbox_oldest_pending_age_seconds",
            "Age in seconds of the oldest pending outbox event",
        ))?;
        let published = IntCounter::with_opts(opts(
            "outbox_published_total",
            "Total number of outbox events acknowledged by the broker",
        ))?;
        let failed = IntCounter::with_opts(opts(
            "outbox_publish_failures_total",
            "Total number of failed publish attempts",
        ))?;

        let registry = prometheus::default_registry();
        for metric in [
            Box::new(pending.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(oldest_pending_age_seconds.clone()),
            Box::new(published.clone()),
            Box::new(failed.clone()),
        ] {
            if let Err(e) = registry.register(metric) {
                warn!("Failed to register outbox metric: {}", e);
            }
        }

        Ok(Self {
            pending,
            oldest_pending_age_seconds,
            published,
            failed,
        })
    }
}
