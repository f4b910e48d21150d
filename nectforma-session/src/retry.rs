//! Retry logic with bounded exponential backoff.
//!
//! No deadline is imposed here: callers wrap each attempt in
//! [`crate::timing::with_timeout`] inside the factory.

use std::future::Future;

use tokio::time::sleep;
use tracing::debug;

use crate::config::RetryPolicy;
use crate::error::{Result, SessionError};

/// Execute an async operation with retry using exponential backoff.
///
/// The factory is invoked once, then again after `base_delay × 2^attempt`
/// for every retryable failure (see [`SessionError::is_retryable`]), up to
/// `policy.max_retries` retries. Terminal failures are returned immediately.
/// Exhausting retries yields [`SessionError::RetryExhausted`] carrying the
/// last failure.
///
/// `observer` is told about every retry before the backoff sleep; it cannot
/// change what happens next.
///
/// # Example
///
/// ```rust,no_run
/// use nectforma_session::config::RetryPolicy;
/// use nectforma_session::retry::with_retry;
///
/// # async fn demo() -> nectforma_session::Result<()> {
/// let policy = RetryPolicy::new(3, 500);
/// let role = with_retry(&policy, "fetch_role", None, || async {
///     Ok::<_, nectforma_session::SessionError>("Formateur".to_string())
/// })
/// .await?;
/// # Ok(())
/// # }
/// ```
pub async fn with_retry<F, Fut, T>(
    policy: &RetryPolicy,
    label: &str,
    observer: Option<&(dyn Fn(u32, &SessionError) + Send + Sync)>,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u32 = 0;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_retryable() => return Err(err),
            Err(err) => {
                if attempt >= policy.max_retries {
                    return Err(SessionError::RetryExhausted {
                        label: label.to_string(),
                        attempts: attempt + 1,
                        last_error: err.to_string(),
                    });
                }

                let delay = policy.delay_for(attempt);
                debug!(
                    label,
                    attempt = attempt + 1,
                    backoff_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying after backoff"
                );
                if let Some(notify) = observer {
                    notify(attempt + 1, &err);
                }

                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use parking_lot::Mutex;
    use tokio::time::Instant;

    fn transient() -> SessionError {
        SessionError::TransientRemote("connection reset".into())
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let start = Instant::now();

        let result = with_retry(&RetryPolicy::new(2, 400), "is_super_admin", None, || {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(transient())
                } else {
                    Ok(true)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(true));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(start.elapsed() >= Duration::from_millis(400 + 800));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retries_is_single_attempt() {
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result: Result<()> = with_retry(&RetryPolicy::none(), "once", None, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(transient()) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert!(matches!(result, Err(SessionError::RetryExhausted { attempts: 1, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_failure_is_not_retried() {
        let calls = AtomicU32::new(0);

        let result: Result<()> = with_retry(&RetryPolicy::new(3, 500), "fetch_role", None, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(SessionError::TerminalRemote("permission denied".into())) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result, Err(SessionError::TerminalRemote("permission denied".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_observer_sees_every_retry() {
        let seen = Mutex::new(Vec::new());
        let observer = |attempt: u32, err: &SessionError| seen.lock().push((attempt, err.clone()));

        let result: Result<()> = with_retry(&RetryPolicy::new(3, 10), "fetch_role", Some(&observer), || async {
            Err(transient())
        })
        .await;

        let seen = seen.into_inner();
        assert_eq!(seen.iter().map(|(a, _)| *a).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert!(seen.iter().all(|(_, e)| *e == transient()));
        match result {
            Err(SessionError::RetryExhausted { label, attempts, last_error }) => {
                assert_eq!(label, "fetch_role");
                assert_eq!(attempts, 4);
                assert_eq!(last_error, transient().to_string());
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
