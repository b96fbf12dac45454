//! Crate-wide error types.
//!
//! Task failures never show up here: they are reported as
//! [`TaskResult::Failed`](crate::TaskResult::Failed). These variants describe
//! misuse by the calling layer.

use thiserror::Error;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Crate-wide error type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Task already exists: {id}")]
    DuplicateTask { id: String },

    #[error("Task not found: {id}")]
    TaskNotFound { id: String },

    #[error("Pipeline not found: {id}")]
    PipelineNotFound { id: String },

    #[error("Pipeline {pipeline_id} has no controllable step {step}")]
    StepNotFound { pipeline_id: String, step: String },

    #[error("Pipeline already started: {id}")]
    PipelineAlreadyStarted { id: String },

    #[error("Unhandled action: cannot apply {action} while {state}")]
    UnhandledAction { state: String, action: String },

    #[error("Task {task_id} does not support {operation}")]
    Unsupported { task_id: String, operation: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn task_not_found(id: impl Into<String>) -> Self {
        Self::TaskNotFound { id: id.into() }
    }

    pub fn unsupported(task_id: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::Unsupported {
            task_id: task_id.into(),
            operation: operation.into(),
        }
    }

    pub fn unhandled(state: impl ToString, action: impl ToString) -> Self {
        Self::UnhandledAction {
            state: state.to_string(),
            action: action.to_string(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}
