//! One run of an ordered list of steps.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use priority_list::PositionInfo;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{PipelineEvent, PipelineStep};
use crate::manager::{ManagedTask, TaskManager};
use crate::task::TaskResult;
use crate::{Error, Result};

const EVENT_CAPACITY: usize = 64;

/// Combines the payloads of every step into the pipeline result.
pub type ResultReducer<C> =
    Arc<dyn Fn(&[PipelineStep<C>], &C, &[Option<Value>]) -> Option<Value> + Send + Sync>;

/// Produces a custom status line. Returning `None` falls back to the default.
pub type StatusMessageFn<C> = Arc<dyn Fn(&PipelineExecution<C>) -> Option<String> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Pending,
    Running,
    Success,
    Failed,
    Cancelled,
}

impl PipelineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to a single step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum StepOutcome {
    Pending,
    /// The task creator returned no task.
    Skipped,
    Succeeded(Option<Value>),
    Failed(String),
    Cancelled,
}

impl StepOutcome {
    /// Payload this step hands to later steps.
    pub fn contribution(&self) -> Option<&Value> {
        match self {
            Self::Succeeded(value) => value.as_ref(),
            _ => None,
        }
    }

    fn from_result(result: &TaskResult) -> Self {
        match result {
            TaskResult::Success { result } => Self::Succeeded(result.clone()),
            TaskResult::Failed { error } => Self::Failed(error.clone()),
            TaskResult::Cancelled => Self::Cancelled,
        }
    }
}

/// Terminal outcome of a pipeline. Produced exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineExecutionResult {
    pub pipeline_id: String,
    pub status: PipelineStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub steps: Vec<StepOutcome>,
    pub finished_at: DateTime<Utc>,
}

/// Snapshot of one step, as returned by [`PipelineExecution::get_step`].
#[derive(Debug, Clone)]
pub struct StepInfo {
    pub index: usize,
    pub name: String,
    pub manager: String,
    pub continue_on_fail: bool,
    pub continue_on_cancel: bool,
    pub outcome: StepOutcome,
    /// The step's task, once created.
    pub task: Option<Arc<ManagedTask>>,
    /// Where the task sits in its manager's queue, while it is listed.
    pub position: Option<PositionInfo>,
}

/// Builder for [`PipelineExecution`].
pub struct PipelineBuilder<C> {
    id: Option<String>,
    context: C,
    steps: Vec<PipelineStep<C>>,
    reducer: Option<ResultReducer<C>>,
    status_message: Option<StatusMessageFn<C>>,
}

impl<C: Send + Sync + 'static> PipelineBuilder<C> {
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn step(mut self, step: PipelineStep<C>) -> Self {
        self.steps.push(step);
        self
    }

    pub fn steps(mut self, steps: impl IntoIterator<Item = PipelineStep<C>>) -> Self {
        self.steps.extend(steps);
        self
    }

    /// Without a reducer the pipeline result is the last step's payload.
    pub fn reduce_results<F>(mut self, reducer: F) -> Self
    where
        F: Fn(&[PipelineStep<C>], &C, &[Option<Value>]) -> Option<Value> + Send + Sync + 'static,
    {
        self.reducer = Some(Arc::new(reducer));
        self
    }

    pub fn status_message<F>(mut self, status_message: F) -> Self
    where
        F: Fn(&PipelineExecution<C>) -> Option<String> + Send + Sync + 'static,
    {
        self.status_message = Some(Arc::new(status_message));
        self
    }

    pub fn build(self) -> PipelineExecution<C> {
        let step_count = self.steps.len();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        PipelineExecution {
            inner: Arc::new(Inner {
                id: self.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
                steps: self.steps,
                context: self.context,
                reducer: self.reducer,
                status_message: self.status_message,
                run: Mutex::new(RunState {
                    started_at: None,
                    status: PipelineStatus::Pending,
                    current_step: None,
                    outcomes: vec![StepOutcome::Pending; step_count],
                    tasks: vec![None; step_count],
                    last_error: None,
                }),
                result: watch::Sender::new(None),
                events,
                cancel: CancellationToken::new(),
            }),
        }
    }
}

/// A single run of a step list.
///
/// Each step's task is created only once the previous step produced a result
/// that lets the pipeline go on. Cloning yields another handle to the same run.
pub struct PipelineExecution<C> {
    inner: Arc<Inner<C>>,
}

struct Inner<C> {
    id: String,
    steps: Vec<PipelineStep<C>>,
    context: C,
    reducer: Option<ResultReducer<C>>,
    status_message: Option<StatusMessageFn<C>>,
    run: Mutex<RunState>,
    result: watch::Sender<Option<PipelineExecutionResult>>,
    events: broadcast::Sender<PipelineEvent>,
    /// Fired by [`PipelineExecution::cancel`].
    cancel: CancellationToken,
}

struct RunState {
    started_at: Option<DateTime<Utc>>,
    status: PipelineStatus,
    current_step: Option<usize>,
    outcomes: Vec<StepOutcome>,
    tasks: Vec<Option<Arc<ManagedTask>>>,
    last_error: Option<String>,
}

impl<C> Clone for PipelineExecution<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Send + Sync + 'static> PipelineExecution<C> {
    pub fn builder(context: C) -> PipelineBuilder<C> {
        PipelineBuilder {
            id: None,
            context,
            steps: Vec::new(),
            reducer: None,
            status_message: None,
        }
    }

    pub fn new(context: C, steps: Vec<PipelineStep<C>>) -> Self {
        Self::builder(context).steps(steps).build()
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn context(&self) -> &C {
        &self.inner.context
    }

    pub fn status(&self) -> PipelineStatus {
        self.inner.run.lock().status
    }

    /// Index of the step being worked on.
    pub fn current_step(&self) -> Option<usize> {
        self.inner.run.lock().current_step
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.inner.run.lock().started_at
    }

    /// The terminal result, once there is one.
    pub fn result(&self) -> Option<PipelineExecutionResult> {
        self.inner.result.borrow().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.inner.events.subscribe()
    }

    /// Begin running the steps in the background.
    ///
    /// Fails with [`Error::PipelineAlreadyStarted`] on a second call.
    pub fn start(&self) -> Result<()> {
        {
            let mut run = self.inner.run.lock();
            if run.started_at.is_some() {
                return Err(Error::PipelineAlreadyStarted {
                    id: self.inner.id.clone(),
                });
            }
            run.started_at = Some(Utc::now());
            run.status = PipelineStatus::Running;
        }

        info!(pipeline_id = %self.inner.id, steps = self.inner.steps.len(), "Pipeline started");
        self.emit(PipelineEvent::Started {
            pipeline_id: self.inner.id.clone(),
        });

        let this = self.clone();
        tokio::spawn(async move { this.drive().await });
        Ok(())
    }

    /// Resolves with the terminal result.
    pub async fn await_result(&self) -> PipelineExecutionResult {
        let mut rx = self.inner.result.subscribe();
        loop {
            if let Some(result) = rx.borrow_and_update().clone() {
                return result;
            }
            if rx.changed().await.is_err() {
                // The sender lives in `inner`, which we hold.
                return self.terminal(PipelineStatus::Cancelled, None, None);
            }
        }
    }

    /// Stop the pipeline: cancel the current step's task and create no further
    /// tasks.
    ///
    /// A pipeline that was never started finishes as cancelled right away.
    pub async fn cancel(&self) -> Result<()> {
        self.inner.cancel.cancel();

        let (started, task) = {
            let run = self.inner.run.lock();
            let task = run
                .current_step
                .and_then(|index| run.tasks[index].clone().map(|task| (index, task)));
            (run.started_at.is_some(), task)
        };

        if !started {
            self.inner.run.lock().started_at = Some(Utc::now());
            self.finish(PipelineStatus::Cancelled, None, None);
            return Ok(());
        }

        match task {
            Some((index, task)) if !task.is_finished() => {
                info!(pipeline_id = %self.inner.id, step = index, "Cancelling pipeline");
                self.inner.steps[index]
                    .manager()
                    .cancel_task(task.id())
                    .await
            }
            _ => Ok(()),
        }
    }

    pub fn get_steps(&self) -> Vec<StepInfo> {
        (0..self.inner.steps.len())
            .filter_map(|index| self.get_step(index))
            .collect()
    }

    pub fn get_step(&self, index: usize) -> Option<StepInfo> {
        let step = self.inner.steps.get(index)?;
        let (outcome, task) = {
            let run = self.inner.run.lock();
            (run.outcomes[index].clone(), run.tasks[index].clone())
        };
        let position = task
            .as_ref()
            .and_then(|task| step.manager().get_task_position_info(task.id()));

        Some(StepInfo {
            index,
            name: step.name().to_string(),
            manager: step.manager().label().to_string(),
            continue_on_fail: step.continue_on_fail(),
            continue_on_cancel: step.continue_on_cancel(),
            outcome,
            task,
            position,
        })
    }

    /// The step whose task has id `task_id`.
    pub fn get_step_by_id(&self, task_id: &str) -> Option<StepInfo> {
        let index = self
            .inner
            .run
            .lock()
            .tasks
            .iter()
            .position(|task| task.as_ref().is_some_and(|task| task.id() == task_id))?;
        self.get_step(index)
    }

    /// The task of step `index` and the manager it runs on.
    pub(crate) fn step_task(&self, index: usize) -> Option<(TaskManager, Arc<ManagedTask>)> {
        let step = self.inner.steps.get(index)?;
        let task = self.inner.run.lock().tasks[index].clone()?;
        Some((step.manager().clone(), task))
    }

    /// One-line summary of where the pipeline is.
    ///
    /// Tries the custom formatter, then the current task's own message, then
    /// the last error, then the final status, then the current step's name.
    pub fn generate_status_message(&self) -> String {
        if let Some(custom) = &self.inner.status_message
            && let Some(message) = custom(self)
        {
            return message;
        }

        let (status, current, task, last_error) = {
            let run = self.inner.run.lock();
            let task = run.current_step.and_then(|index| run.tasks[index].clone());
            (run.status, run.current_step, task, run.last_error.clone())
        };

        if let Some(message) = task.and_then(|task| task.status_message()) {
            return message;
        }
        if let Some(error) = last_error {
            return format!("Error: {error}");
        }
        if status.is_terminal() {
            return format!("Pipeline {status}");
        }
        if let Some(step) = current.and_then(|index| self.inner.steps.get(index)) {
            return format!("Running step: {}", step.name());
        }
        "Idle".to_string()
    }

    async fn drive(&self) {
        let mut previous: Option<Value> = None;

        for (index, step) in self.inner.steps.iter().enumerate() {
            if self.inner.cancel.is_cancelled() {
                self.finish(PipelineStatus::Cancelled, None, None);
                return;
            }

            let contributions = {
                let mut run = self.inner.run.lock();
                run.current_step = Some(index);
                run.outcomes
                    .iter()
                    .map(|outcome| outcome.contribution().cloned())
                    .collect::<Vec<_>>()
            };

            let Some(task) = step.create_task(&self.inner.context, previous.as_ref(), &contributions)
            else {
                debug!(pipeline_id = %self.inner.id, step = index, name = %step.name(), "Step skipped");
                self.record(index, step, StepOutcome::Skipped);
                previous = None;
                continue;
            };

            let managed = match step.manager().add_task(task, step.options().clone()).await {
                Ok(managed) => managed,
                Err(e) => {
                    error!(pipeline_id = %self.inner.id, step = index, error = %e, "Could not queue step task");
                    let message = e.to_string();
                    self.record(index, step, StepOutcome::Failed(message.clone()));
                    self.finish(PipelineStatus::Failed, None, Some(message));
                    return;
                }
            };
            self.inner.run.lock().tasks[index] = Some(Arc::clone(&managed));

            // A cancel that landed while the task was being queued saw no task.
            if self.inner.cancel.is_cancelled()
                && let Err(e) = step.manager().cancel_task(managed.id()).await
            {
                warn!(pipeline_id = %self.inner.id, step = index, error = %e, "Could not cancel step task");
            }

            let result = self.follow(index, step, &managed).await;
            self.record(index, step, StepOutcome::from_result(&result));

            match result {
                TaskResult::Success { result } => {
                    let last = index + 1 == self.inner.steps.len();
                    previous = result;
                    if last {
                        let payload = self.reduce(previous.take());
                        self.finish(PipelineStatus::Success, payload, None);
                        return;
                    }
                }
                TaskResult::Failed { error } if step.continue_on_fail() => {
                    debug!(pipeline_id = %self.inner.id, step = index, error = %error, "Step failed, continuing");
                    self.inner.run.lock().last_error = Some(error);
                    previous = None;
                }
                TaskResult::Failed { error } => {
                    self.finish(PipelineStatus::Failed, None, Some(error));
                    return;
                }
                TaskResult::Cancelled if step.continue_on_cancel() => {
                    debug!(pipeline_id = %self.inner.id, step = index, "Step cancelled, continuing");
                    previous = None;
                }
                TaskResult::Cancelled => {
                    self.finish(PipelineStatus::Cancelled, None, None);
                    return;
                }
            }
        }

        // The last step was skipped or its failure was absorbed.
        if self.inner.cancel.is_cancelled() {
            self.finish(PipelineStatus::Cancelled, None, None);
        } else {
            self.finish(PipelineStatus::Success, None, None);
        }
    }

    /// Wait for the step's task to finish, announcing when it starts.
    async fn follow(
        &self,
        index: usize,
        step: &PipelineStep<C>,
        managed: &Arc<ManagedTask>,
    ) -> TaskResult {
        tokio::select! {
            biased;
            started = managed.wait_started() => {
                if started {
                    self.emit(PipelineEvent::StepTaskStarted {
                        pipeline_id: self.inner.id.clone(),
                        step_index: index,
                        step_name: step.name().to_string(),
                        task_id: managed.id().to_string(),
                    });
                }
            }
            result = managed.wait() => return result,
        }
        managed.wait().await
    }

    fn reduce(&self, last: Option<Value>) -> Option<Value> {
        let Some(reducer) = &self.inner.reducer else {
            return last;
        };
        let contributions: Vec<Option<Value>> = self
            .inner
            .run
            .lock()
            .outcomes
            .iter()
            .map(|outcome| outcome.contribution().cloned())
            .collect();
        reducer(&self.inner.steps, &self.inner.context, &contributions)
    }

    fn record(&self, index: usize, step: &PipelineStep<C>, outcome: StepOutcome) {
        self.inner.run.lock().outcomes[index] = outcome.clone();
        self.emit(PipelineEvent::StepCompleted {
            pipeline_id: self.inner.id.clone(),
            step_index: index,
            step_name: step.name().to_string(),
            outcome,
        });
    }

    fn terminal(
        &self,
        status: PipelineStatus,
        result: Option<Value>,
        error: Option<String>,
    ) -> PipelineExecutionResult {
        PipelineExecutionResult {
            pipeline_id: self.inner.id.clone(),
            status,
            result,
            error,
            steps: self.inner.run.lock().outcomes.clone(),
            finished_at: Utc::now(),
        }
    }

    fn finish(&self, status: PipelineStatus, result: Option<Value>, error: Option<String>) {
        let outcome = self.terminal(status, result, error.clone());
        let recorded = self.inner.result.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(outcome.clone());
            true
        });
        if !recorded {
            return;
        }

        {
            let mut run = self.inner.run.lock();
            run.status = status;
            run.current_step = None;
            if error.is_some() {
                run.last_error = error.clone();
            }
        }

        match &error {
            Some(error) => {
                info!(pipeline_id = %self.inner.id, status = %status, error = %error, "Pipeline finished")
            }
            None => info!(pipeline_id = %self.inner.id, status = %status, "Pipeline finished"),
        }
        self.emit(PipelineEvent::Completed {
            pipeline_id: self.inner.id.clone(),
            result: outcome,
        });
    }

    fn emit(&self, event: PipelineEvent) {
        let _ = self.inner.events.send(event);
    }
}

impl<C> fmt::Debug for PipelineExecution<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineExecution")
            .field("id", &self.inner.id)
            .field("steps", &self.inner.steps.len())
            .field("status", &self.inner.run.lock().status)
            .finish()
    }
}
