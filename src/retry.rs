//! Bounded retry with exponential backoff for calls to external services.
//!
//! Only [`RecommendError::Transient`] is retried. Any other error is returned
//! as-is on first sight. When the attempts run out, the last transient error
//! is converted into [`RecommendError::Unavailable`] so callers can tell a
//! spent retry budget apart from a single hiccup.

use std::{future::Future, time::Duration};

use tracing::{debug, warn};

use crate::config::RecommenderConfig;
use crate::error::{RecommendError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Values below 1 are treated as 1.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubled for each one after.
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    pub fn from_config(config: &RecommenderConfig) -> Self {
        Self::new(config.max_retries.saturating_add(1), config.retry_backoff())
    }

    /// A single attempt, no waiting.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }

    /// Run `op` until it succeeds, fails hard, or the attempts are spent.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("Request succeeded on attempt {}", attempt);
                    }
                    return Ok(value);
                }
                Err(RecommendError::Transient { service, message }) => {
                    if attempt >= attempts {
                        warn!("{} still failing after {} attempts", service, attempts);
                        return Err(RecommendError::Unavailable {
                            service,
                            attempts,
                            message,
                        });
                    }

                    let delay = self.delay_for(attempt);
                    warn!(
                        "Transient {} failure ({}), attempt {}/{}; retrying in {:?}",
                        service, message, attempt, attempts, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(other) => return Err(other),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn transient() -> RecommendError {
        RecommendError::Transient {
            service: "embeddings",
            message: "rate limited".into(),
        }
    }

    #[tokio::test]
    async fn retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let policy = RetryPolicy::new(3, Duration::ZERO);

        let value = policy
            .run(move || async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(transient())
                } else {
                    Ok(7)
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_become_unavailable() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let policy = RetryPolicy::new(2, Duration::ZERO);

        let err = policy
            .run(move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(transient())
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RecommendError::Unavailable { attempts: 2, .. }
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fatal_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let policy = RetryPolicy::new(5, Duration::ZERO);

        let err = policy
            .run(move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(RecommendError::Fatal {
                    service: "embeddings",
                    message: "invalid api key".into(),
                })
            })
            .await
            .unwrap_err();

        assert!(matches!(err, RecommendError::Fatal { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn backoff_doubles() {
        let policy = RetryPolicy::new(4, Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
    }

    #[test]
    fn from_config_counts_first_attempt() {
        let config = RecommenderConfig {
            max_retries: 2,
            retry_backoff_ms: 10,
            ..Default::default()
        };
        let policy = RetryPolicy::from_config(&config);
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_millis(10));
    }
}
