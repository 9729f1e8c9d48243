// src/utils/retry.rs

//! Bounded retry with exponential backoff.

use std::future::Future;
use std::time::Duration;

use crate::error::Result;
use crate::models::RetryConfig;

/// Longest single backoff sleep.
const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Retry settings for one I/O stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub retry_limit: u32,
    /// Sleep before the first retry; doubled for each further retry
    pub backoff_base: Duration,
}

impl RetryPolicy {
    pub fn new(retry_limit: u32, backoff_base: Duration) -> Self {
        Self {
            retry_limit,
            backoff_base,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.retry_limit, Duration::from_millis(config.backoff_base_ms))
    }

    /// No retries at all.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Sleep before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.backoff_base.saturating_mul(factor).min(MAX_BACKOFF)
    }

    /// Run `op` until it succeeds, fails permanently, or the retry budget is
    /// spent. Only [`AppError::is_transient`](crate::error::AppError::is_transient)
    /// failures are retried; the last error is returned unchanged.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut retries = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_transient() && retries < self.retry_limit => {
                    retries += 1;
                    let delay = self.delay_for(retries);
                    log::warn!(
                        "{} failed ({}); retry {}/{} in {:?}",
                        operation,
                        error,
                        retries,
                        self.retry_limit,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
