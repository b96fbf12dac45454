//! Step definitions.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::manager::{AddTaskOptions, TaskManager};
use crate::task::Task;

/// Builds the task for a step once the pipeline reaches it.
///
/// Receives the pipeline context, the previous step's payload, and the
/// payloads of every earlier step (index-aligned, `None` for steps that were
/// skipped or produced nothing). Returning `None` skips the step.
pub type TaskCreator<C> =
    Arc<dyn Fn(&C, Option<&Value>, &[Option<Value>]) -> Option<Arc<dyn Task>> + Send + Sync>;

/// One stage of a pipeline.
pub struct PipelineStep<C> {
    name: String,
    task_creator: TaskCreator<C>,
    manager: TaskManager,
    continue_on_fail: bool,
    continue_on_cancel: bool,
    options: AddTaskOptions,
}

impl<C> PipelineStep<C> {
    pub fn new<F>(name: impl Into<String>, manager: TaskManager, task_creator: F) -> Self
    where
        F: Fn(&C, Option<&Value>, &[Option<Value>]) -> Option<Arc<dyn Task>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            task_creator: Arc::new(task_creator),
            manager,
            continue_on_fail: false,
            continue_on_cancel: false,
            options: AddTaskOptions::default(),
        }
    }

    /// Keep going with an empty payload when this step fails.
    pub fn with_continue_on_fail(mut self, continue_on_fail: bool) -> Self {
        self.continue_on_fail = continue_on_fail;
        self
    }

    /// Keep going with an empty payload when this step is cancelled.
    pub fn with_continue_on_cancel(mut self, continue_on_cancel: bool) -> Self {
        self.continue_on_cancel = continue_on_cancel;
        self
    }

    /// How the step's task is queued on its manager.
    pub fn with_options(mut self, options: AddTaskOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.options.priority = Some(priority);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn manager(&self) -> &TaskManager {
        &self.manager
    }

    pub fn continue_on_fail(&self) -> bool {
        self.continue_on_fail
    }

    pub fn continue_on_cancel(&self) -> bool {
        self.continue_on_cancel
    }

    pub fn options(&self) -> &AddTaskOptions {
        &self.options
    }

    pub(crate) fn create_task(
        &self,
        context: &C,
        previous: Option<&Value>,
        all: &[Option<Value>],
    ) -> Option<Arc<dyn Task>> {
        (self.task_creator)(context, previous, all)
    }
}

impl<C> Clone for PipelineStep<C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            task_creator: Arc::clone(&self.task_creator),
            manager: self.manager.clone(),
            continue_on_fail: self.continue_on_fail,
            continue_on_cancel: self.continue_on_cancel,
            options: self.options.clone(),
        }
    }
}

impl<C> fmt::Debug for PipelineStep<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineStep")
            .field("name", &self.name)
            .field("manager", &self.manager.label())
            .field("continue_on_fail", &self.continue_on_fail)
            .field("continue_on_cancel", &self.continue_on_cancel)
            .finish()
    }
}
