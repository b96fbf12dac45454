//! Events published by a [`TaskManager`](super::TaskManager).

use serde::Serialize;

use crate::task::{TaskResult, TaskState};

/// Events emitted by a task manager.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskManagerEvent {
    /// A task was queued.
    TaskAdded {
        manager: String,
        task_id: String,
        priority: i64,
        force_run: bool,
    },
    /// A queued task changed state.
    TaskStateChanged {
        manager: String,
        task_id: String,
        state: TaskState,
    },
    /// A failed task will be retried after `delay_ms`.
    TaskRetrying {
        manager: String,
        task_id: String,
        /// Retry number, starting at 1.
        attempt: u32,
        error: String,
        delay_ms: u64,
    },
    /// A task produced its final result and will not run again on its own.
    TaskFinished {
        manager: String,
        task_id: String,
        result: TaskResult,
    },
    /// A task was dropped from the queue.
    TaskRemoved { manager: String, task_id: String },
    /// Queue order changed through an administrative call.
    QueueReordered { manager: String },
}

impl TaskManagerEvent {
    pub fn task_id(&self) -> Option<&str> {
        match self {
            Self::TaskAdded { task_id, .. }
            | Self::TaskStateChanged { task_id, .. }
            | Self::TaskRetrying { task_id, .. }
            | Self::TaskFinished { task_id, .. }
            | Self::TaskRemoved { task_id, .. } => Some(task_id),
            Self::QueueReordered { .. } => None,
        }
    }
}
