/// Exponential backoff with jitter for retry-forever loops
use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay after the first failure
    pub initial: Duration,
    /// Upper bound for any single delay
    pub max: Duration,
    /// Growth factor applied after every failure
    pub multiplier: f64,
    /// Add random jitter to each delay (±20%)
    pub jitter: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(200),
            max: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Stateful delay sequence: grows on every `next_delay`, restarts on `reset`.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    current: Duration,
    attempts: u32,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            current: config.initial,
            config,
            attempts: 0,
        }
    }

    /// Number of delays handed out since the last reset
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn next_delay(&mut self) -> Duration {
        let base = self.current.min(self.config.max);
        self.attempts = self.attempts.saturating_add(1);
        self.current = Duration::from_millis(
            (self.current.as_millis() as f64 * self.config.multiplier)
                .min(self.config.max.as_millis() as f64) as u64,
        );
        apply_jitter(base, self.config.jitter).min(self.config.max)
    }

    pub fn reset(&mut self) {
        self.current = self.config.initial;
        self.attempts = 0;
    }

    /// Deterministic delay for the n-th consecutive failure, without jitter.
    ///
    /// Used where the attempt count is persisted rather than held in memory.
    pub fn delay_for_attempt(config: &BackoffConfig, attempt: u32) -> Duration {
        let factor = config.multiplier.powi(attempt.min(63) as i32);
        let millis = (config.initial.as_millis() as f64 * factor).min(config.max.as_millis() as f64);
        Duration::from_millis(millis as u64)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(BackoffConfig::default())
    }
}

fn apply_jitter(base: Duration, jitter: bool) -> Duration {
    if jitter {
        let factor = 1.0 + rand::thread_rng().gen_range(-0.2..0.2);
        Duration::from_millis((base.as_millis() as f64 * factor) as u64)
    } else {
        base
    }
}
