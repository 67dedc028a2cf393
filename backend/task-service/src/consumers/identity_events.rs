//! Kafka consumer for identity-service events
//!
//! Keeps the local `accounts` replica in step with the issuer.
//!
//! Supported events:
//! - Accounts.CreateAccount -> upsert replica row
//! - Accounts.UpdateAccount -> upsert replica row
//! - Accounts.DeleteAccount -> delete replica row
//!
//! Messages are handled one at a time in delivery order. The offset is
//! committed after the message's own transaction finishes, whatever the
//! outcome, so a malformed or unappliable message never stalls the loop.
//! Pids whose write kept failing are listed in [`HealthSnapshot::failed_pids`]
//! so the issuer can replay them. A message whose retries are cut short by
//! shutdown is left uncommitted and redelivered on the next start.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use event_schema::AccountEvent;
use resilience::{Backoff, BackoffConfig};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::consumers::source::{InboundMessage, MessageSource};
use crate::db::ReplicaStore;
use crate::metrics::ReplicaMetrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsumerState {
    Starting,
    Polling,
    Processing,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    /// Event name this replica does not track
    Ignored,
    /// Empty or malformed message
    Skipped,
    /// Well-formed but the local write kept failing
    Failed,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Applied => "applied",
            Outcome::Ignored => "ignored",
            Outcome::Skipped => "skipped",
            Outcome::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub state: ConsumerState,
    pub applied: u64,
    pub ignored: u64,
    pub skipped: u64,
    pub failed: u64,
    pub broker_errors: u64,
    pub last_offset: Option<i64>,
    pub last_error: Option<String>,
    /// Most recent pids whose write was given up on, oldest first
    pub failed_pids: Vec<Uuid>,
}

const MAX_FAILED_PIDS: usize = 100;

impl Default for HealthSnapshot {
    fn default() -> Self {
        Self {
            state: ConsumerState::Starting,
            applied: 0,
            ignored: 0,
            skipped: 0,
            failed: 0,
            broker_errors: 0,
            last_offset: None,
            last_error: None,
            failed_pids: Vec::new(),
        }
    }
}

/// Shared view of the consumer for health reporting.
#[derive(Debug, Clone, Default)]
pub struct ConsumerHealth {
    inner: Arc<RwLock<HealthSnapshot>>,
}

impl ConsumerHealth {
    pub fn snapshot(&self) -> HealthSnapshot {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn state(&self) -> ConsumerState {
        self.snapshot().state
    }

    fn update(&self, f: impl FnOnce(&mut HealthSnapshot)) {
        match self.inner.write() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    fn set_state(&self, state: ConsumerState) {
        self.update(|h| h.state = state);
    }

    fn record(&self, outcome: Outcome, offset: i64) {
        self.update(|h| {
            match outcome {
                Outcome::Applied => h.applied += 1,
                Outcome::Ignored => h.ignored += 1,
                Outcome::Skipped => h.skipped += 1,
                Outcome::Failed => h.failed += 1,
            }
            h.last_offset = Some(offset);
        });
    }

    fn record_failed_pid(&self, pid: Uuid) {
        self.update(|h| {
            if h.failed_pids.len() == MAX_FAILED_PIDS {
                h.failed_pids.remove(0);
            }
            h.failed_pids.push(pid);
        });
    }

    fn record_error(&self, error: String, broker: bool) {
        self.update(|h| {
            if broker {
                h.broker_errors += 1;
            }
            h.last_error = Some(error);
        });
    }
}

/// Marks the consumer stopped however `run` exits, panics included.
struct StoppedGuard(ConsumerHealth);

impl Drop for StoppedGuard {
    fn drop(&mut self) {
        self.0.set_state(ConsumerState::Stopped);
    }
}

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub poll_timeout: Duration,
    /// Delay between polls after broker errors
    pub backoff: BackoffConfig,
    /// Tries per message before it counts as failed
    pub apply_attempts: u32,
    /// Delay between replica write retries
    pub apply_backoff: BackoffConfig,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_secs(10),
            backoff: BackoffConfig::default(),
            // 0.5s, 1s, 2s ... capped at 30s: rides out about a minute of
            // database downtime
            apply_attempts: 8,
            apply_backoff: BackoffConfig {
                initial: Duration::from_millis(500),
                max: Duration::from_secs(30),
                multiplier: 2.0,
                jitter: false,
            },
        }
    }
}

/// Consumer for the identity topic
pub struct IdentityReplicaConsumer<S: MessageSource> {
    source: S,
    store: Arc<dyn ReplicaStore>,
    config: ConsumerConfig,
    health: ConsumerHealth,
    metrics: Option<ReplicaMetrics>,
}

impl<S: MessageSource> IdentityReplicaConsumer<S> {
    pub fn new(source: S, store: Arc<dyn ReplicaStore>, config: ConsumerConfig) -> Self {
        Self {
            source,
            store,
            config,
            health: ConsumerHealth::default(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: ReplicaMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn health(&self) -> ConsumerHealth {
        self.health.clone()
    }

    /// Poll until `shutdown` flips to true or its sender is dropped.
    ///
    /// A message already being processed is finished and committed first.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let _stopped = StoppedGuard(self.health.clone());
        let mut backoff = Backoff::new(self.config.backoff.clone());

        info!(
            poll_timeout_ms = self.config.poll_timeout.as_millis() as u64,
            "Identity replica consumer starting"
        );
        self.health.set_state(ConsumerState::Polling);

        loop {
            if *shutdown.borrow() {
                break;
            }

            let polled = tokio::select! {
                polled = self.source.poll(self.config.poll_timeout) => polled,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            };

            match polled {
                Ok(None) => debug!("No identity events within poll timeout"),
                Ok(Some(message)) => {
                    backoff.reset();
                    self.process(&message, &mut shutdown).await;
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    warn!(
                        error = %e,
                        attempt = backoff.attempts(),
                        retry_in_ms = delay.as_millis() as u64,
                        "Kafka consumer error"
                    );
                    self.health.record_error(e.to_string(), true);

                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        changed = shutdown.changed() => {
                            if changed.is_err() || *shutdown.borrow() {
                                break;
                            }
                        }
                    }
                }
            }
        }

        info!("Identity replica consumer stopped");
    }

    async fn process(&self, message: &InboundMessage, shutdown: &mut watch::Receiver<bool>) {
        self.health.set_state(ConsumerState::Processing);

        let Some(outcome) = self.handle(message, shutdown).await else {
            info!(
                offset = message.offset,
                partition = message.partition,
                "Shutdown during replica write retries; leaving message uncommitted"
            );
            self.health.set_state(ConsumerState::Polling);
            return;
        };

        if let Err(e) = self.source.commit(message).await {
            warn!(
                offset = message.offset,
                partition = message.partition,
                error = %e,
                "Failed to commit offset; message may be redelivered"
            );
            self.health.record_error(e.to_string(), true);
        }

        self.health.record(outcome, message.offset);
        if let Some(metrics) = &self.metrics {
            metrics.record(outcome.as_str());
        }
        self.health.set_state(ConsumerState::Polling);
    }

    /// `None` when shutdown interrupted the write retries.
    async fn handle(
        &self,
        message: &InboundMessage,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Option<Outcome> {
        let Some(payload) = message.payload.as_deref() else {
            warn!(
                offset = message.offset,
                reason = "empty_payload",
                "Skipping identity message"
            );
            return Some(Outcome::Skipped);
        };

        let event = match AccountEvent::decode(payload) {
            Ok(Some(event)) => event,
            Ok(None) => {
                debug!(offset = message.offset, "Ignoring identity event type");
                return Some(Outcome::Ignored);
            }
            Err(e) => {
                warn!(
                    offset = message.offset,
                    reason = "malformed",
                    error = %e,
                    "Skipping identity message"
                );
                self.health.record_error(e.to_string(), false);
                return Some(Outcome::Skipped);
            }
        };

        let attempts = self.config.apply_attempts.max(1);
        for attempt in 1..=attempts {
            match self.store.apply(&event).await {
                Ok(()) => {
                    info!(
                        event = event.name(),
                        pid = %event.pid(),
                        offset = message.offset,
                        "Applied identity event to replica"
                    );
                    return Some(Outcome::Applied);
                }
                Err(e) if attempt < attempts => {
                    let delay =
                        Backoff::delay_for_attempt(&self.config.apply_backoff, attempt - 1);
                    warn!(
                        event = event.name(),
                        pid = %event.pid(),
                        attempt,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %e,
                        "Replica write failed, retrying"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown.changed() => return None,
                    }
                }
                Err(e) => {
                    error!(
                        event = event.name(),
                        pid = %event.pid(),
                        offset = message.offset,
                        error = %e,
                        "Replica write failed, giving up on message"
                    );
                    self.health.record_error(e.to_string(), false);
                    self.health.record_failed_pid(event.pid());
                }
            }
        }

        Some(Outcome::Failed)
    }
}

/// Running consumer task plus its controls.
pub struct ConsumerHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
    health: ConsumerHealth,
}

impl ConsumerHandle {
    pub fn health(&self) -> ConsumerHealth {
        self.health.clone()
    }

    /// Ask the loop to stop and wait for it.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.join.await {
            error!("Identity replica consumer task failed: {}", e);
        }
    }
}

/// Start the consumer as an independent background task.
pub fn spawn_replica_consumer<S>(
    source: S,
    store: Arc<dyn ReplicaStore>,
    config: ConsumerConfig,
    metrics: Option<ReplicaMetrics>,
) -> ConsumerHandle
where
    S: MessageSource + 'static,
{
    let mut consumer = IdentityReplicaConsumer::new(source, store, config);
    if let Some(metrics) = metrics {
        consumer = consumer.with_metrics(metrics);
    }
    let health = consumer.health();
    let (shutdown, rx) = watch::channel(false);
    let join = tokio::spawn(async move { consumer.run(rx).await });

    ConsumerHandle {
        shutdown,
        join,
        health,
    }
}
