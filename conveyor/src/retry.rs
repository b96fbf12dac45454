//! Retry policy applied to failed tasks.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::config::RetryConfig;

/// Decides whether a failed attempt is retried and how long to wait first.
///
/// `attempt` counts retries: the first retry is attempt 1. A task is retried
/// while `attempt < max_retries`, so it runs at most `max_retries + 1` times.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryContext {
    max_retries: u32,
    retry_delay: Duration,
    multiplier: f64,
    max_delay: Option<Duration>,
}

impl RetryContext {
    pub fn new(max_retries: u32, retry_delay: Duration, multiplier: f64) -> Self {
        Self {
            max_retries,
            retry_delay,
            multiplier,
            max_delay: None,
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Whether a task that has already been retried `attempt` times may be
    /// retried again.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }

    /// Back-off before retry number `attempt` (1-based):
    /// `retry_delay * multiplier^(attempt - 1)`, capped by `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let millis = self.retry_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        let delay = Duration::from_millis(millis.max(0.0).min(u64::MAX as f64) as u64);
        match self.max_delay {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }

    /// Run `callback` once the back-off for `attempt` has elapsed.
    pub fn schedule<F>(&self, attempt: u32, callback: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let delay = self.delay_for_attempt(attempt);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            callback.await;
        })
    }
}

impl From<&RetryConfig> for RetryContext {
    fn from(config: &RetryConfig) -> Self {
        let context = Self::new(
            config.max_retries,
            config.retry_delay(),
            config.retry_delay_multiplier,
        );
        match config.max_delay() {
            Some(cap) => context.with_max_delay(cap),
            None => context,
        }
    }
}
