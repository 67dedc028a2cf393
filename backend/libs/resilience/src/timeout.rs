/// Timeout wrapper for outbound calls
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

/// Outcome of a bounded fallible call.
///
/// The inner error is kept typed so callers can tell a rejection apart from
/// an unreachable peer.
#[derive(Debug, thiserror::Error)]
pub enum CallError<E> {
    #[error("Operation timed out after {0:?}")]
    TimedOut(Duration),
    #[error("Operation failed: {0}")]
    Failed(E),
}

impl<E> CallError<E> {
    pub fn is_timeout(&self) -> bool {
        matches!(self, CallError::TimedOut(_))
    }
}

/// Execute a fallible future with timeout
pub async fn call_with_timeout<F, T, E>(duration: Duration, future: F) -> Result<T, CallError<E>>
where
    F: Future<Output = Result<T, E>>,
{
    match timeout(duration, future).await {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(e)) => Err(CallError::Failed(e)),
        Err(_) => {
            debug!(timeout_ms = duration.as_millis() as u64, "Call timed out");
            Err(CallError::TimedOut(duration))
        }
    }
}
