//! Capability traits implemented by the code that does the actual work.

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::TaskResult;

/// Error type returned by control functions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Per-attempt context handed to every control call.
#[derive(Debug, Clone)]
pub struct TaskContext {
    task_id: String,
    attempt: u32,
    cancellation_token: CancellationToken,
}

impl TaskContext {
    pub(crate) fn new(task_id: impl Into<String>, attempt: u32) -> Self {
        Self {
            task_id: task_id.into(),
            attempt,
            cancellation_token: CancellationToken::new(),
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// How many times the work has been started, counting the current run.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Fired as soon as cancellation is dispatched to the task.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation_token
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}

/// The base capability every piece of work provides.
///
/// `start` must not resolve while the work is merely paused: pausing holds
/// completion back rather than racing it.
#[async_trait]
pub trait TaskControls: Send + Sync + 'static {
    async fn start(&self, ctx: &TaskContext) -> Result<TaskResult, BoxError>;

    /// Release whatever a failed or cancelled attempt left behind before the
    /// task is retried.
    async fn cleanup(&self, _ctx: &TaskContext) -> Result<(), BoxError> {
        Ok(())
    }

    fn status(&self, _ctx: &TaskContext) -> Option<Value> {
        None
    }

    fn status_message(&self, _ctx: &TaskContext) -> Option<String> {
        None
    }

    /// Pause/resume support. Queried once when the task is built.
    fn as_pausable(&self) -> Option<&dyn Pausable> {
        None
    }

    /// Cancellation support. Queried once when the task is built.
    fn as_cancellable(&self) -> Option<&dyn Cancellable> {
        None
    }
}

/// Optional capability: suspend and resume work in flight.
#[async_trait]
pub trait Pausable: Send + Sync {
    async fn pause(&self, ctx: &TaskContext) -> Result<(), BoxError>;

    async fn resume(&self, ctx: &TaskContext) -> Result<(), BoxError>;
}

/// Optional capability: stop work in flight.
#[async_trait]
pub trait Cancellable: Send + Sync {
    async fn cancel(&self, ctx: &TaskContext) -> Result<(), BoxError>;
}
