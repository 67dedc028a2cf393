use prometheus::{IntCounterVec, Opts};
use tracing::warn;

/// Per-message outcomes of the identity replica consumer:
/// applied, ignored, skipped, failed.
#[derive(Clone)]
pub struct ReplicaMetrics {
    pub events: IntCounterVec,
}

impl ReplicaMetrics {
    pub fn new(service: &str) -> prometheus::Result<Self> {
        let events = IntCounterVec::new(
            Opts::new(
                "identity_replica_events_total",
                "Identity events handled by the replica consumer, by outcome",
            )
            .const_label("service", service.to_string()),
            &["outcome"],
        )?;

        if let Err(e) = prometheus::default_registry().register(Box::new(events.clone())) {
            warn!("Failed to register replica metric: {}", e);
        }

        Ok(Self { events })
    }

    pub fn record(&self, outcome: &str) {
        self.events.with_label_values(&[outcome]).inc();
    }
}
