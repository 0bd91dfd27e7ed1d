//! Bounded retry for store calls.
//!
//! Exponential backoff via `backon`. Only [`LedgerError::StoreUnavailable`]
//! is retried; validation and config errors return on the first attempt.

use std::future::Future;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use serde::Deserialize;

use crate::errors::{LedgerError, Result};

/// Retry configuration (`[sync.retry]`).
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_max_attempts() -> usize {
    3
}

fn default_initial_backoff_ms() -> u64 {
    100
}

fn default_max_backoff_ms() -> u64 {
    2_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl RetryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(LedgerError::config("sync.retry.max_attempts must be >= 1"));
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(LedgerError::config(format!(
                "sync.retry.initial_backoff_ms ({}) exceeds max_backoff_ms ({})",
                self.initial_backoff_ms, self.max_backoff_ms
            )));
        }
        Ok(())
    }

    fn backoff(&self) -> ExponentialBuilder {
        // with_max_times counts retries, not attempts.
        ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(self.initial_backoff_ms))
            .with_max_delay(Duration::from_millis(self.max_backoff_ms))
            .with_factor(2.0)
            .with_max_times(self.max_attempts.saturating_sub(1))
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// the attempts run out. The last error is returned as-is.
pub async fn with_backoff<F, Fut, T>(operation: F, config: &RetryConfig) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    operation
        .retry(config.backoff())
        .when(|err: &LedgerError| err.is_retryable())
        .notify(|err: &LedgerError, delay: Duration| {
            tracing::warn!(
                error = %err,
                category = err.category().as_str(),
                delay_ms = delay.as_millis() as u64,
                "store call failed, retrying"
            );
        })
        .await
}
