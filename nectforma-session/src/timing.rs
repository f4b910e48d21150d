//! Timed operations — race a single attempt against a deadline
//!
//! The timer lives inside `tokio::time::timeout` and is dropped together with
//! the returned future, so nothing stays scheduled after success, failure or
//! timeout. Retrying is the caller's business (see [`crate::retry`]).

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::{Result, SessionError};

/// Resolve `operation` if it settles within `deadline`, else `SessionError::Timeout`
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
/// use nectforma_session::timing::with_timeout;
///
/// # async fn demo() -> nectforma_session::Result<()> {
/// let value = with_timeout("get_session", Duration::from_secs(6), async {
///     Ok::<_, nectforma_session::SessionError>(42)
/// })
/// .await?;
/// assert_eq!(value, 42);
/// # Ok(())
/// # }
/// ```
pub async fn with_timeout<T, F>(label: &str, deadline: Duration, operation: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(deadline, operation).await {
        Ok(result) => result,
        Err(_) => {
            let after_ms = deadline.as_millis() as u64;
            warn!(label, after_ms, "Operation timed out");
            Err(SessionError::Timeout {
                label: label.to_string(),
                after_ms,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    #[tokio::test(start_paused = true)]
    async fn test_completes_before_deadline() {
        let result = with_timeout("fast", Duration::from_millis(100), async {
            sleep(Duration::from_millis(99)).await;
            Ok(7)
        })
        .await;
        assert_eq!(result, Ok(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_after_deadline() {
        let result = with_timeout("slow", Duration::from_millis(100), async {
            sleep(Duration::from_millis(101)).await;
            Ok(7)
        })
        .await;
        assert_eq!(
            result,
            Err(SessionError::Timeout { label: "slow".into(), after_ms: 100 })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_inner_failure_passes_through() {
        let result: Result<()> = with_timeout("failing", Duration::from_secs(1), async {
            Err(SessionError::TerminalRemote("permission denied".into()))
        })
        .await;
        assert_eq!(result, Err(SessionError::TerminalRemote("permission denied".into())));
    }

    // Neither outcome leaves the deadline timer pending: the timer is owned
    // by the returned future, so a fast success never waits out the 5s
    // deadline and a timeout returns as soon as its own deadline fires.
    #[tokio::test(start_paused = true)]
    async fn test_fast_path_does_not_wait_for_deadline() {
        let start = tokio::time::Instant::now();
        let _ = with_timeout("fast", Duration::from_secs(5), async { Ok(()) }).await;
        let _ = with_timeout("slow", Duration::from_millis(10), std::future::pending::<Result<()>>()).await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(10));
        assert!(elapsed < Duration::from_secs(5));
    }
}
