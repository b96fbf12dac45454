//! [`ControllableTask`]: drives a [`TaskControls`] implementation through the
//! transition table in [`fsm`](super::fsm).

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::fsm::{self, Action, Effect, FsmState};
use super::{
    PauseTrigger, Task, TaskCapabilities, TaskContext, TaskControls, TaskEvent, TaskResult,
    TaskState,
};
use crate::Result;

const EVENT_CAPACITY: usize = 64;

/// Adapts plain async control functions into a [`Task`].
///
/// Cloning yields another handle to the same task.
#[derive(Clone)]
pub struct ControllableTask {
    inner: Arc<Inner>,
}

struct Inner {
    id: String,
    controls: Arc<dyn TaskControls>,
    capabilities: TaskCapabilities,
    machine: Mutex<Machine>,
    events: broadcast::Sender<TaskEvent>,
}

struct Machine {
    state: FsmState,
    attempt: u32,
    context: TaskContext,
    last_result: Option<TaskResult>,
}

impl ControllableTask {
    pub fn new(id: impl Into<String>, controls: impl TaskControls) -> Self {
        Self::from_arc(id, Arc::new(controls))
    }

    pub fn from_arc(id: impl Into<String>, controls: Arc<dyn TaskControls>) -> Self {
        let id = id.into();
        let capabilities = TaskCapabilities {
            pause: controls.as_pausable().is_some(),
            resume: controls.as_pausable().is_some(),
            cancel: controls.as_cancellable().is_some(),
        };
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            inner: Arc::new(Inner {
                machine: Mutex::new(Machine {
                    state: FsmState::Idle,
                    attempt: 0,
                    context: TaskContext::new(id.clone(), 0),
                    last_result: None,
                }),
                id,
                controls,
                capabilities,
                events,
            }),
        }
    }

    /// Internal state, finer grained than [`Task::state`].
    pub fn fsm_state(&self) -> FsmState {
        self.inner.machine.lock().state
    }

    /// Number of times the work has been started.
    pub fn attempt(&self) -> u32 {
        self.inner.machine.lock().attempt
    }

    /// Result of the most recent finished attempt.
    pub fn last_result(&self) -> Option<TaskResult> {
        self.inner.machine.lock().last_result.clone()
    }

    /// Feed `action` into the state machine and perform the resulting effects
    /// until the machine settles.
    pub async fn dispatch(&self, action: Action) -> Result<()> {
        let mut next = Some(action);
        while let Some(action) = next.take() {
            let (effect, ctx) = self.inner.step(&action)?;
            next = self.apply(effect, ctx).await;
        }
        Ok(())
    }

    async fn apply(&self, effect: Effect, ctx: TaskContext) -> Option<Action> {
        let inner = &self.inner;
        match effect {
            Effect::None | Effect::Publish(_) => None,
            Effect::RunStart => {
                inner.spawn_attempt(ctx);
                None
            }
            Effect::CallPause => {
                let pausable = inner.controls.as_pausable()?;
                let ok = match pausable.pause(&ctx).await {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(task_id = %inner.id, error = %e, "Pause control failed");
                        false
                    }
                };
                Some(Action::PauseSettled { ok })
            }
            Effect::CallResume => {
                let pausable = inner.controls.as_pausable()?;
                let ok = match pausable.resume(&ctx).await {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(task_id = %inner.id, error = %e, "Resume control failed");
                        false
                    }
                };
                Some(Action::ResumeSettled { ok })
            }
            Effect::CallCancel => {
                ctx.cancellation_token().cancel();
                if let Some(cancellable) = inner.controls.as_cancellable()
                    && let Err(e) = cancellable.cancel(&ctx).await
                {
                    warn!(task_id = %inner.id, error = %e, "Cancel control failed");
                }
                Some(Action::CancelSettled)
            }
            Effect::CallCleanup => {
                if let Err(e) = inner.controls.cleanup(&ctx).await {
                    warn!(task_id = %inner.id, error = %e, "Cleanup failed, retrying anyway");
                }
                Some(Action::CleanedUp)
            }
        }
    }
}

impl Inner {
    /// Apply one transition under the lock. Events are sent before the lock is
    /// released so subscribers see them in transition order.
    fn step(&self, action: &Action) -> Result<(Effect, TaskContext)> {
        let mut machine = self.machine.lock();
        let effect = self.transition_locked(&mut machine, action)?;
        Ok((effect, machine.context.clone()))
    }

    fn transition_locked(&self, machine: &mut Machine, action: &Action) -> Result<Effect> {
        let transition = fsm::transition(machine.state, action, self.capabilities)?;

        if let Some(operation) = transition.unsupported {
            warn!(
                task_id = %self.id,
                state = %machine.state,
                operation,
                "Ignoring dispatch the task does not support"
            );
        }

        if transition.effect == Effect::RunStart {
            machine.attempt += 1;
            machine.context = TaskContext::new(self.id.clone(), machine.attempt);
        }

        let previous = machine.state;
        machine.state = transition.next;
        if previous.public() != transition.next.public() {
            debug!(task_id = %self.id, from = %previous, to = %transition.next, "Task state changed");
            let _ = self.events.send(TaskEvent::StateChanged {
                task_id: self.id.clone(),
                state: transition.next.public(),
            });
        }

        if let Effect::Publish(result) = &transition.effect {
            machine.last_result = Some(result.clone());
            let _ = self.events.send(TaskEvent::Completed {
                task_id: self.id.clone(),
                result: result.clone(),
            });
        }

        Ok(transition.effect)
    }

    fn spawn_attempt(self: &Arc<Self>, ctx: TaskContext) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = AssertUnwindSafe(inner.controls.start(&ctx))
                .catch_unwind()
                .await;
            let result = match outcome {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => TaskResult::failed(e),
                Err(_) => TaskResult::failed("task panicked"),
            };
            inner.complete(ctx.attempt(), result);
        });
    }

    /// Report the outcome of `attempt`. Outcomes of superseded attempts are
    /// dropped.
    fn complete(&self, attempt: u32, result: TaskResult) {
        let mut machine = self.machine.lock();
        if machine.attempt != attempt {
            debug!(task_id = %self.id, attempt, "Dropping result of a superseded attempt");
            return;
        }
        if let Err(e) = self.transition_locked(&mut machine, &Action::Complete(result)) {
            debug!(task_id = %self.id, error = %e, "Dropping late result");
        }
    }
}

impl std::fmt::Debug for ControllableTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllableTask")
            .field("id", &self.inner.id)
            .field("state", &self.fsm_state())
            .field("capabilities", &self.inner.capabilities)
            .finish()
    }
}

#[async_trait]
impl Task for ControllableTask {
    fn id(&self) -> &str {
        &self.inner.id
    }

    fn state(&self) -> TaskState {
        self.fsm_state().public()
    }

    fn capabilities(&self) -> TaskCapabilities {
        self.inner.capabilities
    }

    fn pause_trigger(&self) -> Option<PauseTrigger> {
        self.fsm_state().pause_trigger()
    }

    fn status(&self) -> Option<Value> {
        let ctx = self.inner.machine.lock().context.clone();
        self.inner.controls.status(&ctx)
    }

    fn status_message(&self) -> Option<String> {
        let ctx = self.inner.machine.lock().context.clone();
        self.inner.controls.status_message(&ctx)
    }

    fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.inner.events.subscribe()
    }

    async fn start(&self) -> Result<()> {
        self.dispatch(Action::Start).await
    }

    async fn pause(&self) -> Result<()> {
        self.dispatch(Action::Pause(PauseTrigger::User)).await
    }

    async fn resume(&self) -> Result<()> {
        self.dispatch(Action::Resume).await
    }

    async fn cancel(&self) -> Result<()> {
        self.dispatch(Action::Cancel).await
    }

    async fn requeue(&self) -> Result<()> {
        self.dispatch(Action::Pause(PauseTrigger::Requeue)).await
    }

    async fn prepare_retry(&self) -> Result<()> {
        self.dispatch(Action::Retry).await
    }
}
