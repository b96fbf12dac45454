//! Scheduler-side wrapper around a queued [`Task`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

use crate::retry::RetryContext;
use crate::task::{PauseTrigger, Task, TaskCapabilities, TaskEvent, TaskResult, TaskState};

const EVENT_CAPACITY: usize = 64;

/// A task queued on a [`TaskManager`](super::TaskManager).
///
/// Adds retry bookkeeping and the start claim to the wrapped task, and
/// re-publishes the task's events on its own channel.
pub struct ManagedTask {
    task: Arc<dyn Task>,
    /// Retries performed so far.
    attempt: AtomicU32,
    retry: RetryContext,
    /// Bypasses the concurrency limit and queue position.
    force_run: AtomicBool,
    /// Cleared while a retry back-off is pending.
    retry_ready: AtomicBool,
    /// Held while the scheduler is inside `Task::start`.
    starting: AtomicBool,
    /// Set when the task fell out of the window while its resume was in flight.
    requeue_requested: AtomicBool,
    started: watch::Sender<bool>,
    result: watch::Sender<Option<TaskResult>>,
    events: broadcast::Sender<TaskEvent>,
    /// Fired when the task leaves its manager.
    detached: CancellationToken,
    added_at: DateTime<Utc>,
}

impl ManagedTask {
    pub(crate) fn new(task: Arc<dyn Task>, retry: RetryContext, force_run: bool) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            task,
            attempt: AtomicU32::new(0),
            retry,
            force_run: AtomicBool::new(force_run),
            retry_ready: AtomicBool::new(true),
            starting: AtomicBool::new(false),
            requeue_requested: AtomicBool::new(false),
            started: watch::Sender::new(false),
            result: watch::Sender::new(None),
            events,
            detached: CancellationToken::new(),
            added_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &str {
        self.task.id()
    }

    pub fn task(&self) -> &Arc<dyn Task> {
        &self.task
    }

    pub fn state(&self) -> TaskState {
        self.task.state()
    }

    pub fn capabilities(&self) -> TaskCapabilities {
        self.task.capabilities()
    }

    pub fn status(&self) -> Option<Value> {
        self.task.status()
    }

    pub fn status_message(&self) -> Option<String> {
        self.task.status_message()
    }

    /// Retries performed so far.
    pub fn attempt(&self) -> u32 {
        self.attempt.load(Ordering::SeqCst)
    }

    pub fn retry_context(&self) -> &RetryContext {
        &self.retry
    }

    pub fn is_force_run(&self) -> bool {
        self.force_run.load(Ordering::SeqCst)
    }

    pub fn is_retry_ready(&self) -> bool {
        self.retry_ready.load(Ordering::SeqCst)
    }

    pub fn added_at(&self) -> DateTime<Utc> {
        self.added_at
    }

    /// Final result, once the manager has given up on the task.
    pub fn result(&self) -> Option<TaskResult> {
        self.result.borrow().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.result.borrow().is_some()
    }

    pub fn has_started(&self) -> bool {
        *self.started.borrow()
    }

    /// Events of the wrapped task, re-published once the manager has seen them.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.events.subscribe()
    }

    /// Resolves once the task first reaches `running`.
    ///
    /// Returns `false` if the task finished without ever running.
    pub async fn wait_started(&self) -> bool {
        let mut started = self.started.subscribe();
        let mut result = self.result.subscribe();
        loop {
            if *started.borrow_and_update() {
                return true;
            }
            if result.borrow_and_update().is_some() {
                return false;
            }
            tokio::select! {
                changed = started.changed() => if changed.is_err() { return false },
                changed = result.changed() => if changed.is_err() { return false },
            }
        }
    }

    /// Resolves with the final result.
    pub async fn wait(&self) -> TaskResult {
        let mut rx = self.result.subscribe();
        loop {
            if let Some(result) = rx.borrow_and_update().clone() {
                return result;
            }
            // The sender lives in `self`, so the channel outlives this borrow.
            if rx.changed().await.is_err() {
                return TaskResult::Cancelled;
            }
        }
    }

    /// Holds a slot: the work is in flight or a start call is under way.
    pub(crate) fn is_occupying(&self) -> bool {
        self.starting.load(Ordering::SeqCst) || self.state().is_active()
    }

    /// May be picked up by the scheduler.
    pub(crate) fn is_startable(&self) -> bool {
        if self.is_finished() || self.starting.load(Ordering::SeqCst) {
            return false;
        }
        match self.state() {
            TaskState::Idle => true,
            TaskState::AwaitingRetry => self.is_retry_ready(),
            TaskState::Paused => {
                self.task.pause_trigger() == Some(PauseTrigger::Requeue) && self.is_retry_ready()
            }
            _ => false,
        }
    }

    /// Take the start claim. Only one caller wins until [`Self::release_claim`].
    pub(crate) fn try_claim(&self) -> bool {
        self.starting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub(crate) fn release_claim(&self) {
        self.starting.store(false, Ordering::SeqCst);
    }

    pub(crate) fn is_starting(&self) -> bool {
        self.starting.load(Ordering::SeqCst)
    }

    pub(crate) fn request_requeue(&self) {
        self.requeue_requested.store(true, Ordering::SeqCst);
    }

    /// Consume a pending requeue request.
    pub(crate) fn take_requeue_request(&self) -> bool {
        self.requeue_requested.swap(false, Ordering::SeqCst)
    }

    pub(crate) fn set_force_run(&self, force_run: bool) {
        self.force_run.store(force_run, Ordering::SeqCst);
    }

    pub(crate) fn set_retry_ready(&self, ready: bool) {
        self.retry_ready.store(ready, Ordering::SeqCst);
    }

    /// Count one more retry and return the new total.
    pub(crate) fn next_attempt(&self) -> u32 {
        self.attempt.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn reset_attempts(&self) {
        self.attempt.store(0, Ordering::SeqCst);
    }

    pub(crate) fn mark_started(&self) {
        self.started.send_if_modified(|started| !std::mem::replace(started, true));
    }

    /// Record the final result. Returns `false` if one was already recorded.
    pub(crate) fn finish(&self, result: TaskResult) -> bool {
        self.result.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(result);
            true
        })
    }

    /// Forget the final result so the task can run again. Returns `true` if
    /// there was one.
    pub(crate) fn reopen(&self) -> bool {
        self.result.send_replace(None).is_some()
    }

    pub(crate) fn publish(&self, event: TaskEvent) {
        let _ = self.events.send(event);
    }

    pub(crate) fn detached(&self) -> &CancellationToken {
        &self.detached
    }
}

impl std::fmt::Debug for ManagedTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedTask")
            .field("id", &self.id())
            .field("state", &self.state())
            .field("attempt", &self.attempt())
            .field("force_run", &self.is_force_run())
            .finish()
    }
}
