// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Bounded retry with a per-attempt deadline, used around every chain call.
//!
//! Each attempt runs under `tokio::time::timeout`. When the deadline fires the
//! attempt's future is dropped, so the in-flight request is cancelled instead of
//! being left to finish in the background.

use crate::config::HttpConfig;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub attempt_timeout: Duration,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, attempt_timeout: Duration, delay: Duration) -> Self {
        Self {
            max_attempts,
            attempt_timeout,
            delay,
        }
    }
}

impl From<&HttpConfig> for RetryPolicy {
    fn from(config: &HttpConfig) -> Self {
        Self {
            max_attempts: config.retry_amount,
            attempt_timeout: Duration::from_secs(config.timeout_secs),
            delay: Duration::from_secs(config.retry_delay_secs),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RetryError<E> {
    #[error("no attempts were made")]
    NoAttempts,
    #[error("timeout reached after {0:?}")]
    Timeout(Duration),
    #[error("{0}")]
    Operation(E),
}

impl<E> RetryError<E> {
    /// The error returned by the operation itself, if the last attempt did not
    /// time out.
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            RetryError::Operation(e) => Some(e),
            _ => None,
        }
    }
}

/// Runs `op` until it succeeds or `policy.max_attempts` attempts have failed,
/// sleeping `policy.delay` between failed attempts. Returns the last error.
pub async fn retry_with_timeout<T, E, F, Fut>(
    policy: &RetryPolicy,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut last_error = RetryError::NoAttempts;
    for attempt in 1..=policy.max_attempts {
        match tokio::time::timeout(policy.attempt_timeout, op()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => last_error = RetryError::Operation(e),
            Err(_) => last_error = RetryError::Timeout(policy.attempt_timeout),
        }
        let retries_left = policy.max_attempts - attempt;
        debug!(
            "Retrying, retries left: {}, error: {}",
            retries_left, last_error
        );
        if retries_left > 0 {
            tokio::time::sleep(policy.delay).await;
        }
    }
    Err(last_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    fn policy(attempts: usize, timeout_ms: u64, delay_ms: u64) -> RetryPolicy {
        RetryPolicy::new(
            attempts,
            Duration::from_millis(timeout_ms),
            Duration::from_millis(delay_ms),
        )
    }

    #[tokio::test]
    async fn test_always_failing_op_runs_exactly_n_times() {
        let calls = &AtomicUsize::new(0);
        let start = Instant::now();
        let result: Result<(), _> = retry_with_timeout(&policy(3, 100, 20), || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>("fail amount is more than zero")
        })
        .await;

        assert_eq!(
            result,
            Err(RetryError::Operation("fail amount is more than zero"))
        );
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // two sleeps between three attempts, none after the last one
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(40), "{:?}", elapsed);
        assert!(elapsed < Duration::from_secs(2), "{:?}", elapsed);
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let remaining_failures = &AtomicUsize::new(3);
        let result = retry_with_timeout(&policy(4, 100, 1), || async move {
            if remaining_failures.load(Ordering::SeqCst) == 0 {
                return Ok(7u32);
            }
            remaining_failures.fetch_sub(1, Ordering::SeqCst);
            Err("fail amount is more than zero")
        })
        .await;
        assert_eq!(result, Ok(7));

        remaining_failures.store(3, Ordering::SeqCst);
        let result = retry_with_timeout(&policy(3, 100, 1), || async move {
            if remaining_failures.load(Ordering::SeqCst) == 0 {
                return Ok(7u32);
            }
            remaining_failures.fetch_sub(1, Ordering::SeqCst);
            Err("fail amount is more than zero")
        })
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_zero_attempts_never_invokes_op() {
        let calls = &AtomicUsize::new(0);
        let result = retry_with_timeout(&policy(0, 100, 1), || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, String>(())
        })
        .await;
        assert_eq!(result, Err(RetryError::NoAttempts));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_slow_attempts_time_out() {
        let calls = &AtomicUsize::new(0);
        let result = retry_with_timeout(&policy(2, 5, 1), || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, String>(())
        })
        .await;
        assert_eq!(result, Err(RetryError::Timeout(Duration::from_millis(5))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // a fast enough attempt is not affected by the deadline
        let result = retry_with_timeout(&policy(1, 200, 1), || async move {
            tokio::time::sleep(Duration::from_millis(2)).await;
            Ok::<_, String>(())
        })
        .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_timed_out_attempt_is_cancelled() {
        let completed = Arc::new(AtomicBool::new(false));
        let flag = completed.clone();
        let result = retry_with_timeout(&policy(1, 5, 1), move || {
            let flag = flag.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                flag.store(true, Ordering::SeqCst);
                Ok::<_, String>(())
            }
        })
        .await;
        assert!(matches!(result, Err(RetryError::Timeout(_))));

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(!completed.load(Ordering::SeqCst));
    }
}
