/// Resilience primitives shared by the services
///
/// - **Timeout**: bounds every outbound call; a call that does not finish in
///   time is reported separately from one that failed.
/// - **Backoff**: exponential delay with jitter and a cap, for loops that must
///   retry forever (broker polling, outbox relay).
///
/// # Example: bounded call that keeps the typed error
///
/// ```rust,no_run
/// use resilience::{call_with_timeout, CallError};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() {
///     let result = call_with_timeout(Duration::from_secs(2), async {
///         Ok::<_, std::io::Error>(())
///     })
///     .await;
///
///     if let Err(CallError::TimedOut(elapsed)) = result {
///         eprintln!("gave up after {elapsed:?}");
///     }
/// }
/// ```

pub mod backoff;
pub mod timeout;

pub use backoff::{Backoff, BackoffConfig};
pub use timeout::{call_with_timeout, CallError};
