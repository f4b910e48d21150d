//! Property tests for the retry and timeout wrappers

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use proptest::prelude::*;
use tokio::time::{sleep, Instant};

use nectforma_session::retry::with_retry;
use nectforma_session::timing::with_timeout;
use nectforma_session::{RetryPolicy, SessionError};

fn paused_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap()
}

proptest! {
    #[test]
    fn always_failing_call_makes_n_plus_one_attempts(max_retries in 0u32..6, base_delay_ms in 1u64..200) {
        let policy = RetryPolicy::new(max_retries, base_delay_ms);
        let calls = AtomicU32::new(0);

        let (result, elapsed) = paused_runtime().block_on(async {
            let start = Instant::now();
            let result: Result<(), SessionError> = with_retry(&policy, "always_failing", None, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(SessionError::TransientRemote("unreachable".into())) }
            })
            .await;
            (result, start.elapsed())
        });

        prop_assert_eq!(calls.load(Ordering::SeqCst), max_retries + 1);
        prop_assert!(elapsed >= policy.total_backoff());
        let exhausted = matches!(result, Err(SessionError::RetryExhausted { attempts, .. }) if attempts == max_retries + 1);
        prop_assert!(exhausted);
    }

    #[test]
    fn deadline_splits_early_and_late_completions(deadline_ms in 10u64..10_000, epsilon_ms in 1u64..10) {
        let deadline = Duration::from_millis(deadline_ms);

        let (early, late) = paused_runtime().block_on(async {
            let early = with_timeout("early", deadline, async {
                sleep(Duration::from_millis(deadline_ms - epsilon_ms)).await;
                Ok(1)
            })
            .await;
            let late = with_timeout("late", deadline, async {
                sleep(Duration::from_millis(deadline_ms + epsilon_ms)).await;
                Ok(2)
            })
            .await;
            (early, late)
        });

        prop_assert_eq!(early, Ok(1));
        prop_assert_eq!(late, Err(SessionError::Timeout { label: "late".into(), after_ms: deadline_ms }));
    }
}
