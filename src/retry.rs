//! Repeated attempts against one endpoint.
//!
//! Small-object strategies give every URL a few tries and keep the first
//! success. Between tries the loop may back off exponentially.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// How many times to try an endpoint and how long to wait in between.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total tries, the first one included. Zero is treated as one.
    pub max_attempts: u32,
    /// Wait before the second try; doubles for every further try.
    pub backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::once()
    }
}

impl RetryConfig {
    /// A single try, no retries.
    pub const fn once() -> Self {
        Self::attempts(1)
    }

    /// `max_attempts` tries back to back.
    pub const fn attempts(max_attempts: u32) -> Self {
        Self { max_attempts, backoff_ms: 0, max_backoff_ms: 0 }
    }

    /// Sleep `backoff_ms` after the first failure, doubling each time up
    /// to `max_backoff_ms`.
    pub fn with_backoff(mut self, backoff_ms: u64, max_backoff_ms: u64) -> Self {
        self.backoff_ms = backoff_ms;
        self.max_backoff_ms = max_backoff_ms;
        self
    }

    fn tries(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Pause before try number `attempt` (1-based; the first try never waits).
    pub fn backoff(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }

        let factor = 1u64.checked_shl(attempt - 2).unwrap_or(u64::MAX);
        Duration::from_millis(self.backoff_ms.saturating_mul(factor).min(self.max_backoff_ms))
    }
}

/// What a run of tries ended with.
#[derive(Debug)]
pub struct Attempted<T, E> {
    pub outcome: Result<T, E>,
    /// Tries actually made.
    pub attempts: u32,
}

impl<T, E> Attempted<T, E> {
    pub fn ok(self) -> Option<T> {
        self.outcome.ok()
    }
}

/// Call `f` until it succeeds, `config` runs out of tries, or
/// `should_retry` rejects an error.
pub async fn retry_async<T, E, F, Fut, P>(
    config: &RetryConfig,
    label: &str,
    should_retry: P,
    mut f: F,
) -> Attempted<T, E>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let tries = config.tries();
    let mut attempt = 1;

    loop {
        let pause = config.backoff(attempt);
        if !pause.is_zero() {
            debug!("{}: waiting {:?} before try {}/{}", label, pause, attempt, tries);
            sleep(pause).await;
        }

        let error = match f().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!("{}: succeeded on try {}", label, attempt);
                }
                return Attempted { outcome: Ok(value), attempts: attempt };
            }
            Err(error) => error,
        };

        if attempt >= tries || !should_retry(&error) {
            warn!("{}: giving up after {} try(s): {}", label, attempt, error);
            return Attempted { outcome: Err(error), attempts: attempt };
        }

        debug!("{}: try {}/{} failed: {}", label, attempt, tries, error);
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_default_is_a_single_try() {
        assert_eq!(RetryConfig::default(), RetryConfig::once());
        assert_eq!(RetryConfig::attempts(0).tries(), 1);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = RetryConfig::attempts(6).with_backoff(50, 300);

        assert_eq!(config.backoff(1), Duration::ZERO);
        assert_eq!(config.backoff(2), Duration::from_millis(50));
        assert_eq!(config.backoff(3), Duration::from_millis(100));
        assert_eq!(config.backoff(4), Duration::from_millis(200));
        assert_eq!(config.backoff(5), Duration::from_millis(300));
        assert_eq!(config.backoff(90), Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_third_try_succeeds() {
        let tries = AtomicU32::new(0);

        let attempted = retry_async(&RetryConfig::attempts(3), "image", |_: &String| true, || {
            let n = tries.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(format!("timeout #{}", n))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(attempted.attempts, 3);
        assert_eq!(attempted.ok(), Some(2));
    }

    #[tokio::test]
    async fn test_runs_out_of_tries() {
        let tries = AtomicU32::new(0);

        let attempted: Attempted<(), String> =
            retry_async(&RetryConfig::attempts(2), "echo", |_: &String| true, || {
                tries.fetch_add(1, Ordering::SeqCst);
                async { Err("refused".to_string()) }
            })
            .await;

        assert_eq!(attempted.attempts, 2);
        assert_eq!(attempted.outcome.unwrap_err(), "refused");
        assert_eq!(tries.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_rejected_error_is_final() {
        let attempted: Attempted<(), String> = retry_async(
            &RetryConfig::attempts(5),
            "image",
            |e: &String| !e.starts_with("404"),
            || async { Err("404 not found".to_string()) },
        )
        .await;

        assert_eq!(attempted.attempts, 1);
    }
}
