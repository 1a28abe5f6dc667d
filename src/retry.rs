use std::future::Future;
use std::time::Duration;

/// Bounded exponential backoff applied after a failed sync attempt.
///
/// Delays are deterministic: no jitter is added, since a single controller
/// instance is the only client retrying against the remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_secs: u64,
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay_secs: 30,
            max_delay_secs: 600,
        }
    }
}

impl RetryConfig {
    /// Delay before retry `attempt` (1-indexed).
    ///
    /// Formula: `min(base_delay * 2^(attempt - 1), max_delay)`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let exp_delay = self
            .base_delay_secs
            .saturating_mul(1u64.checked_shl(exponent).unwrap_or(u64::MAX));
        Duration::from_secs(exp_delay.min(self.max_delay_secs))
    }

    /// The full delay sequence for attempts `1..=max_retries`.
    pub fn schedule(&self) -> impl Iterator<Item = Duration> + '_ {
        (1..=self.max_retries).map(|attempt| self.delay_for_attempt(attempt))
    }
}

/// Result of a bounded retry sequence.
#[derive(Debug, PartialEq, Eq)]
pub enum RetryOutcome<T, E> {
    /// An attempt succeeded; `attempt` is the 1-indexed retry that did it.
    Resolved { value: T, attempt: u32 },
    /// Every retry failed. Not fatal: the caller moves on to its next round.
    Exhausted { last_error: E, attempts: u32 },
}

impl<T, E> RetryOutcome<T, E> {
    pub fn is_resolved(&self) -> bool {
        matches!(self, RetryOutcome::Resolved { .. })
    }
}

/// Re-run a failed operation with exponential backoff.
///
/// `first_error` is the failure that triggered the sequence. Each retry
/// sleeps `delay_for_attempt(attempt)` before re-invoking `operation`; the
/// attempt counter always starts at 1 for a fresh call.
pub async fn retry_with_backoff<F, Fut, T, E>(
    config: &RetryConfig,
    first_error: E,
    operation: F,
) -> RetryOutcome<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut last_err = first_error;

    for attempt in 1..=config.max_retries {
        let delay = config.delay_for_attempt(attempt);
        tracing::warn!(
            attempt,
            max_retries = config.max_retries,
            "Retrying in {}s after: {}",
            delay.as_secs(),
            last_err
        );
        tokio::time::sleep(delay).await;

        match operation().await {
            Ok(value) => return RetryOutcome::Resolved { value, attempt },
            Err(e) => last_err = e,
        }
    }

    RetryOutcome::Exhausted {
        last_error: last_err,
        attempts: config.max_retries,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn config(max_retries: u32, base: u64, max: u64) -> RetryConfig {
        RetryConfig {
            max_retries,
            base_delay_secs: base,
            max_delay_secs: max,
        }
    }

    #[test]
    fn test_default_config() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.base_delay_secs, 30);
        assert_eq!(config.max_delay_secs, 600);
    }

    #[test]
    fn test_delay_exponential_backoff() {
        let config = config(3, 10, 50);
        let delays: Vec<u64> = config.schedule().map(|d| d.as_secs()).collect();
        assert_eq!(delays, vec![10, 20, 40]);
    }

    #[test]
    fn test_delay_capped_at_max() {
        let config = config(6, 10, 50);
        let delays: Vec<u64> = config.schedule().map(|d| d.as_secs()).collect();
        assert_eq!(delays, vec![10, 20, 40, 50, 50, 50]);
    }

    #[test]
    fn test_delay_never_decreases_and_never_exceeds_cap() {
        for (base, max) in [(1, 1), (3, 100), (7, 1000), (30, 600), (u64::MAX / 2, u64::MAX)] {
            let config = config(80, base, max);
            let delays: Vec<Duration> = config.schedule().collect();
            assert!(delays.windows(2).all(|w| w[0] <= w[1]), "base={base}");
            assert!(delays.iter().all(|d| d.as_secs() <= max), "base={base}");
        }
    }

    #[test]
    fn test_delay_zero_base() {
        let config = config(3, 0, 60);
        assert_eq!(config.delay_for_attempt(1), Duration::ZERO);
        assert_eq!(config.delay_for_attempt(3), Duration::ZERO);
    }

    #[test]
    fn test_attempt_zero_treated_as_first() {
        let config = config(3, 10, 50);
        assert_eq!(config.delay_for_attempt(0), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_failures() {
        let config = config(3, 0, 0);
        let calls = Arc::new(AtomicU32::new(0));
        let cc = calls.clone();
        let outcome: RetryOutcome<i32, String> =
            retry_with_backoff(&config, "initial".to_string(), || {
                let cc = cc.clone();
                async move {
                    let n = cc.fetch_add(1, Ordering::SeqCst);
                    if n < 1 {
                        Err("transient".to_string())
                    } else {
                        Ok(99)
                    }
                }
            })
            .await;
        assert_eq!(
            outcome,
            RetryOutcome::Resolved {
                value: 99,
                attempt: 2
            }
        );
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_exhausted() {
        let config = config(2, 0, 0);
        let calls = Arc::new(AtomicU32::new(0));
        let cc = calls.clone();
        let outcome: RetryOutcome<i32, String> =
            retry_with_backoff(&config, "initial".to_string(), || {
                let cc = cc.clone();
                async move {
                    cc.fetch_add(1, Ordering::SeqCst);
                    Err("still failing".to_string())
                }
            })
            .await;
        assert_eq!(
            outcome,
            RetryOutcome::Exhausted {
                last_error: "still failing".to_string(),
                attempts: 2
            }
        );
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_zero_retries_keeps_first_error() {
        let config = config(0, 10, 50);
        let outcome: RetryOutcome<(), &str> =
            retry_with_backoff(&config, "first", || async { Ok(()) }).await;
        assert_eq!(
            outcome,
            RetryOutcome::Exhausted {
                last_error: "first",
                attempts: 0
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_waits_full_schedule() {
        let config = config(3, 10, 50);
        let start = tokio::time::Instant::now();
        let outcome: RetryOutcome<(), &str> =
            retry_with_backoff(&config, "down", || async { Err("down") }).await;
        assert!(!outcome.is_resolved());
        // 10 + 20 + 40
        assert_eq!(start.elapsed(), Duration::from_secs(70));
    }
}
