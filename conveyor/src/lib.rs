//! Task orchestration core.
//!
//! - [`TaskManager`]: runs tasks in priority order under a concurrency limit
//!   and retries failures with exponential back-off.
//! - [`ControllableTask`]: turns plain async control functions into a
//!   pausable, cancellable, retryable [`Task`].
//! - [`PipelineExecution`]: chains tasks into steps that may run on
//!   different managers.
//!
//! Ordering is backed by the [`priority_list`] crate.

pub mod config;
pub mod error;
pub mod manager;
pub mod pipeline;
pub mod retry;
pub mod task;

pub use config::{RetryConfig, TaskManagerConfig};
pub use error::{Error, Result};
pub use manager::{AddTaskOptions, ManagedTask, TaskManager, TaskManagerEvent};
pub use pipeline::{
    PipelineEvent, PipelineExecution, PipelineExecutionResult, PipelineRegistry, PipelineStatus,
    PipelineStep, StepControl, StepInfo, StepOutcome,
};
pub use priority_list::{Position, PositionInfo, ShiftDirection};
pub use retry::RetryContext;
pub use task::{
    BoxError, Cancellable, ControllableTask, Pausable, PauseTrigger, Task, TaskCapabilities,
    TaskContext, TaskControls, TaskEvent, TaskResult, TaskState,
};
