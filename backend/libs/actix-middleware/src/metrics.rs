use prometheus::{IntCounterVec, Opts};
use tracing::warn;

/// Outcome counters for delegated authorization decisions.
#[derive(Clone)]
pub struct AuthMetrics {
    pub decisions: IntCounterVec,
}

impl AuthMetrics {
    pub fn new(service: &str) -> prometheus::Result<Self> {
        let decisions = IntCounterVec::new(
            Opts::new(
                "delegated_auth_decisions_total",
                "Delegated authorization decisions by outcome",
            )
            .const_label("service", service.to_string()),
            &["outcome"],
        )?;

        if let Err(e) = prometheus::default_registry().register(Box::new(decisions.clone())) {
            warn!("Failed to register auth metric: {}", e);
        }

        Ok(Self { decisions })
    }

    pub fn record(&self, outcome: &str) {
        self.decisions.with_label_values(&[outcome]).inc();
    }
}
