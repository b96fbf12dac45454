//! Task manager configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{Error, Result};

/// Retry behaviour for failed tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retries after the first failure.
    #[serde(default)]
    pub max_retries: u32,
    /// Delay before the first retry in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Multiplier applied to the delay for every further retry.
    #[serde(default = "default_retry_delay_multiplier")]
    pub retry_delay_multiplier: f64,
    /// Upper bound for a single delay in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_delay_ms: Option<u64>,
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_retry_delay_multiplier() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            retry_delay_ms: default_retry_delay_ms(),
            retry_delay_multiplier: default_retry_delay_multiplier(),
            max_delay_ms: None,
        }
    }
}

impl RetryConfig {
    /// Retry up to `max_retries` times with the default back-off.
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// Never retry.
    pub fn no_retry() -> Self {
        Self::default()
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn max_delay(&self) -> Option<Duration> {
        self.max_delay_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.retry_delay_multiplier.is_finite() || self.retry_delay_multiplier < 0.0 {
            return Err(Error::config(format!(
                "retry_delay_multiplier must be a finite, non-negative number (got {})",
                self.retry_delay_multiplier
            )));
        }
        Ok(())
    }
}

/// Configuration for a [`TaskManager`](crate::TaskManager).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskManagerConfig {
    /// Name used in logs and events.
    #[serde(default = "default_label")]
    pub label: String,
    /// Maximum number of tasks running at once, not counting force-started tasks.
    #[serde(default = "default_concurrent_tasks")]
    pub concurrent_tasks: usize,
    /// Retry policy applied to every task of this manager.
    #[serde(default)]
    pub retries: RetryConfig,
    /// Drop tasks from the queue as soon as they reach a terminal state.
    #[serde(default)]
    pub auto_clear_completed_tasks: bool,
    /// Priority used when a task is added without one.
    #[serde(default)]
    pub default_priority: i64,
}

fn default_label() -> String {
    "default".to_string()
}

fn default_concurrent_tasks() -> usize {
    1
}

impl Default for TaskManagerConfig {
    fn default() -> Self {
        Self {
            label: default_label(),
            concurrent_tasks: default_concurrent_tasks(),
            retries: RetryConfig::default(),
            auto_clear_completed_tasks: false,
            default_priority: 0,
        }
    }
}

impl TaskManagerConfig {
    pub fn new(label: impl Into<String>, concurrent_tasks: usize) -> Self {
        Self {
            label: label.into(),
            concurrent_tasks,
            ..Default::default()
        }
    }

    pub fn with_retries(mut self, retries: RetryConfig) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_auto_clear(mut self, auto_clear: bool) -> Self {
        self.auto_clear_completed_tasks = auto_clear;
        self
    }

    pub fn with_default_priority(mut self, priority: i64) -> Self {
        self.default_priority = priority;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.label.trim().is_empty() {
            return Err(Error::config("task manager label must not be empty"));
        }
        self.retries.validate()
    }
}
