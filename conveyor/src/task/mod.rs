//! The task contract understood by the scheduler.
//!
//! The scheduler only ever talks to work through [`Task`]. Anything that keeps
//! track of its own [`TaskState`] and reports exactly one [`TaskResult`] per
//! attempt can be queued. [`ControllableTask`] adapts a set of plain async
//! control functions into this contract.

mod controllable;
mod controls;
pub mod fsm;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::Result;

pub use controllable::ControllableTask;
pub use controls::{BoxError, Cancellable, Pausable, TaskContext, TaskControls};

/// Public lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Idle,
    Running,
    Pausing,
    Paused,
    Resuming,
    Cancelling,
    Cancelled,
    Failed,
    Success,
    AwaitingRetry,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Pausing => "pausing",
            Self::Paused => "paused",
            Self::Resuming => "resuming",
            Self::Cancelling => "cancelling",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
            Self::Success => "success",
            Self::AwaitingRetry => "awaiting_retry",
        }
    }

    /// No further transitions happen without an explicit retry.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Failed | Self::Success)
    }

    /// The task's work is in flight and holds a concurrency slot.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Running | Self::Pausing | Self::Resuming | Self::Cancelling
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a task is paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseTrigger {
    /// Paused on request. Stays paused until resumed or force-started.
    User,
    /// Paused by the scheduler to free a slot. Restarted when eligible again.
    Requeue,
}

/// Outcome of one attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskResult {
    Success {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
    },
    Failed {
        error: String,
    },
    Cancelled,
}

impl TaskResult {
    pub fn success(result: Option<Value>) -> Self {
        Self::Success { result }
    }

    pub fn failed(error: impl fmt::Display) -> Self {
        Self::Failed {
            error: error.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Payload of a successful attempt.
    pub fn result(&self) -> Option<&Value> {
        match self {
            Self::Success { result } => result.as_ref(),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Failed { error } => Some(error),
            _ => None,
        }
    }

    /// Terminal task state matching this result.
    pub fn state(&self) -> TaskState {
        match self {
            Self::Success { .. } => TaskState::Success,
            Self::Failed { .. } => TaskState::Failed,
            Self::Cancelled => TaskState::Cancelled,
        }
    }
}

/// Control operations a task supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaskCapabilities {
    pub pause: bool,
    pub resume: bool,
    pub cancel: bool,
}

/// Events emitted by a single task.
#[derive(Debug, Clone)]
pub enum TaskEvent {
    StateChanged { task_id: String, state: TaskState },
    Completed { task_id: String, result: TaskResult },
}

/// A unit of work the scheduler can run.
///
/// `start` returns as soon as the work is in flight. The outcome arrives later
/// as a [`TaskEvent::Completed`].
#[async_trait]
pub trait Task: Send + Sync + 'static {
    fn id(&self) -> &str;

    fn state(&self) -> TaskState;

    fn capabilities(&self) -> TaskCapabilities;

    /// Why the task is paused, if it is.
    fn pause_trigger(&self) -> Option<PauseTrigger> {
        None
    }

    /// Structured progress detail, if the work reports any.
    fn status(&self) -> Option<Value> {
        None
    }

    /// Human readable progress line, if the work reports one.
    fn status_message(&self) -> Option<String> {
        None
    }

    fn subscribe(&self) -> broadcast::Receiver<TaskEvent>;

    /// Start the work, or pick it up again if it was paused.
    async fn start(&self) -> Result<()>;

    async fn pause(&self) -> Result<()>;

    async fn resume(&self) -> Result<()>;

    async fn cancel(&self) -> Result<()>;

    /// Give up the concurrency slot by pausing until the scheduler restarts it.
    /// On a task the user paused, hands it back to the scheduler.
    async fn requeue(&self) -> Result<()>;

    /// Reset a failed or cancelled task so it can be started again.
    async fn prepare_retry(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_classification() {
        assert!(TaskState::Success.is_terminal());
        assert!(TaskState::Failed.is_terminal());
        assert!(!TaskState::AwaitingRetry.is_terminal());
        assert!(TaskState::Pausing.is_active());
        assert!(!TaskState::Paused.is_active());
        assert_eq!(TaskState::AwaitingRetry.to_string(), "awaiting_retry");
    }

    #[test]
    fn test_result_serialization() {
        let json = serde_json::to_value(TaskResult::success(Some(serde_json::json!({"bytes": 3}))))
            .unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["result"]["bytes"], 3);

        let failed: TaskResult =
            serde_json::from_str(r#"{"status":"failed","error":"boom"}"#).unwrap();
        assert_eq!(failed.error(), Some("boom"));
        assert_eq!(failed.state(), TaskState::Failed);
    }
}
