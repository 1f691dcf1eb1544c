use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::domain::errors::QueryError;
use crate::domain::models::RetryConfig;

/// Retry policy with exponential backoff for query fetches
///
/// Backoff doubles with each retry: 1s → 2s → 4s → ... capped at `max_backoff_ms`.
///
/// # Retry Decision
/// - Retry on: network errors, HTTP 429 and 5xx
/// - Do NOT retry: other HTTP statuses, decode errors
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    initial_backoff_ms: u64,
    max_backoff_ms: u64,
}

impl RetryPolicy {
    pub const fn new(max_retries: u32, initial_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            max_retries,
            initial_backoff_ms,
            max_backoff_ms,
        }
    }

    /// A policy that gives up after the first failure.
    pub const fn none() -> Self {
        Self::new(0, 0, 0)
    }

    /// Execute an operation, retrying transient errors with backoff.
    ///
    /// `keep_going` is consulted before and after every backoff sleep; once
    /// it returns false the last error is returned without further attempts.
    pub async fn execute<F, Fut, T, K>(&self, mut operation: F, keep_going: K) -> Result<T, QueryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, QueryError>>,
        K: Fn() -> bool,
    {
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        debug!(retries = attempt, "fetch succeeded after retrying");
                    }
                    return Ok(result);
                }
                Err(err) => {
                    if !self.should_retry(&err, attempt) || !keep_going() {
                        if attempt > 0 {
                            warn!(attempts = attempt + 1, error = %err, "fetch failed after retrying");
                        }
                        return Err(err);
                    }

                    let backoff = self.calculate_backoff(attempt);
                    warn!(
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "transient fetch error, retrying"
                    );

                    sleep(backoff).await;
                    attempt += 1;

                    if !keep_going() {
                        debug!(attempt, error = %err, "no one waiting after backoff, not retrying");
                        return Err(err);
                    }
                }
            }
        }
    }

    /// Formula: min(initial_backoff * 2^attempt, max_backoff)
    pub(crate) fn calculate_backoff(&self, attempt: u32) -> Duration {
        let backoff_ms = self
            .initial_backoff_ms
            .saturating_mul(2_u64.saturating_pow(attempt))
            .min(self.max_backoff_ms);

        Duration::from_millis(backoff_ms)
    }

    fn should_retry(&self, error: &QueryError, attempt: u32) -> bool {
        attempt < self.max_retries && error.is_transient()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(
            config.max_retries,
            config.initial_backoff_ms,
            config.max_backoff_ms,
        )
    }
}
