//! Priority-ordered, concurrency-limited task scheduler.
//!
//! A [`TaskManager`] keeps its tasks in a [`PriorityList`] and starts them in
//! list order while fewer than `concurrent_tasks` are in flight. Running tasks
//! keep their slot when more urgent work shows up; they only give it back when
//! an administrative change pushes them out of the window, and then only by
//! cooperatively requeueing.

mod events;
mod managed;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use priority_list::{ItemKey, Position, PositionInfo, PriorityList, ShiftDirection};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::config::TaskManagerConfig;
use crate::retry::RetryContext;
use crate::task::{PauseTrigger, Task, TaskEvent, TaskResult, TaskState};
use crate::{Error, Result};

pub use events::TaskManagerEvent;
pub use managed::ManagedTask;

const EVENT_CAPACITY: usize = 256;

/// Options for [`TaskManager::add_task`].
#[derive(Debug, Clone, Default)]
pub struct AddTaskOptions {
    /// Defaults to the manager's `default_priority`.
    pub priority: Option<i64>,
    /// Offset within the priority run.
    pub position: Position,
    /// Start right away, outside the concurrency limit.
    pub force_run: bool,
}

impl AddTaskOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_position(mut self, position: impl Into<Position>) -> Self {
        self.position = position.into();
        self
    }

    pub fn force_run(mut self) -> Self {
        self.force_run = true;
        self
    }
}

/// Schedules tasks in priority order under a concurrency limit.
///
/// Cloning yields another handle to the same manager.
#[derive(Clone)]
pub struct TaskManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    /// Copied from the config; used in logs and events.
    label: String,
    config: RwLock<TaskManagerConfig>,
    queue: Mutex<Queue>,
    events: broadcast::Sender<TaskManagerEvent>,
    /// Number of queued tasks without a final result.
    unfinished: watch::Sender<usize>,
}

struct Queue {
    list: PriorityList<Arc<ManagedTask>>,
    index: HashMap<String, ItemKey>,
}

impl Queue {
    fn get(&self, id: &str) -> Option<&Arc<ManagedTask>> {
        self.index.get(id).and_then(|key| self.list.get(*key))
    }

    fn key(&self, id: &str) -> Result<ItemKey> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| Error::task_not_found(id))
    }

    /// Remove `managed` if it is still the task listed under its id.
    fn take(&mut self, managed: &Arc<ManagedTask>) -> bool {
        let Some(key) = self.index.get(managed.id()).copied() else {
            return false;
        };
        match self.list.get(key) {
            Some(listed) if Arc::ptr_eq(listed, managed) => {
                self.list.remove_item(key);
                self.index.remove(managed.id());
                true
            }
            _ => false,
        }
    }
}

impl TaskManager {
    pub fn new(config: TaskManagerConfig) -> Result<Self> {
        config.validate()?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            inner: Arc::new(ManagerInner {
                label: config.label.clone(),
                config: RwLock::new(config),
                queue: Mutex::new(Queue {
                    list: PriorityList::new(),
                    index: HashMap::new(),
                }),
                events,
                unfinished: watch::Sender::new(0),
            }),
        })
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn config(&self) -> TaskManagerConfig {
        self.inner.config.read().clone()
    }

    pub fn concurrent_tasks(&self) -> usize {
        self.inner.config.read().concurrent_tasks
    }

    pub fn len(&self) -> usize {
        self.inner.queue.lock().list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskManagerEvent> {
        self.inner.events.subscribe()
    }

    /// Queue a task and start whatever became eligible.
    ///
    /// Fails with [`Error::DuplicateTask`] if a task with the same id is queued.
    pub async fn add_task(
        &self,
        task: Arc<dyn Task>,
        options: AddTaskOptions,
    ) -> Result<Arc<ManagedTask>> {
        let (priority, retry) = {
            let config = self.inner.config.read();
            (
                options.priority.unwrap_or(config.default_priority),
                RetryContext::from(&config.retries),
            )
        };
        let managed = Arc::new(ManagedTask::new(task, retry, options.force_run));
        let events = managed.task().subscribe();

        {
            let mut queue = self.inner.queue.lock();
            if queue.index.contains_key(managed.id()) {
                return Err(Error::DuplicateTask {
                    id: managed.id().to_string(),
                });
            }
            let key = queue
                .list
                .add_item(Arc::clone(&managed), priority, options.position);
            queue.index.insert(managed.id().to_string(), key);
        }
        self.inner.unfinished.send_modify(|n| *n += 1);

        info!(
            manager = %self.label(),
            task_id = %managed.id(),
            priority,
            force_run = options.force_run,
            "Task added"
        );
        self.emit(TaskManagerEvent::TaskAdded {
            manager: self.label().to_string(),
            task_id: managed.id().to_string(),
            priority,
            force_run: options.force_run,
        });

        self.spawn_listener(Arc::clone(&managed), events);

        if options.force_run {
            self.start_managed(&managed).await;
        }
        self.start_eligible_tasks().await;
        Ok(managed)
    }

    pub fn get_task(&self, id: &str) -> Option<Arc<ManagedTask>> {
        self.inner.queue.lock().get(id).cloned()
    }

    /// Queued tasks in scheduling order.
    pub fn tasks(&self) -> Vec<Arc<ManagedTask>> {
        self.inner
            .queue
            .lock()
            .list
            .iter()
            .map(|entry| Arc::clone(entry.value))
            .collect()
    }

    /// Tasks holding a slot, force-run tasks excluded.
    pub fn running_count(&self) -> usize {
        self.inner
            .queue
            .lock()
            .list
            .iter()
            .filter(|entry| !entry.value.is_force_run() && entry.value.state().is_active())
            .count()
    }

    /// Scheduling position of one task. O(n).
    pub fn get_task_position_info(&self, id: &str) -> Option<PositionInfo> {
        let queue = self.inner.queue.lock();
        let key = *queue.index.get(id)?;
        queue.list.get_item_position_info(key)
    }

    /// Scheduling position of every task, computed in one pass.
    pub fn get_task_position_info_map(&self) -> HashMap<String, PositionInfo> {
        self.inner
            .queue
            .lock()
            .list
            .iter()
            .map(|entry| (entry.value.id().to_string(), entry.info))
            .collect()
    }

    /// Tasks that may start now, in priority order.
    ///
    /// Takes the first `concurrent_tasks` items that either hold a slot or
    /// could be started, then keeps only the startable ones, at most as many as
    /// there are free slots. Running tasks are never displaced by this.
    pub fn get_eligible_startable_tasks(&self) -> Vec<Arc<ManagedTask>> {
        let limit = self.concurrent_tasks();
        let queue = self.inner.queue.lock();

        let occupied = queue
            .list
            .iter()
            .filter(|entry| !entry.value.is_force_run() && entry.value.is_occupying())
            .count();
        let free = limit.saturating_sub(occupied);
        if free == 0 {
            return Vec::new();
        }

        queue
            .list
            .get_first_x_items(limit, |m| in_window(m))
            .into_iter()
            .filter(|entry| entry.value.is_startable())
            .take(free)
            .map(|entry| Arc::clone(entry.value))
            .collect()
    }

    /// Start every eligible task.
    pub async fn start_eligible_tasks(&self) {
        for managed in self.get_eligible_startable_tasks() {
            self.start_managed(&managed).await;
        }
    }

    /// Ask running tasks that fell outside the concurrency window to give
    /// their slot back.
    ///
    /// A task still resuming is requeued as soon as its resume settles.
    pub async fn reassess_running_tasks(&self) {
        let limit = self.concurrent_tasks();
        let overflow: Vec<Arc<ManagedTask>> = {
            let queue = self.inner.queue.lock();
            queue
                .list
                .get_split(limit, |m| in_window(m))
                .tail
                .into_iter()
                .filter(|entry| {
                    matches!(entry.value.state(), TaskState::Running | TaskState::Resuming)
                })
                .map(|entry| Arc::clone(entry.value))
                .collect()
        };

        for managed in overflow {
            if managed.state() == TaskState::Resuming {
                managed.request_requeue();
                // Whoever holds the start claim picks the request up.
                if managed.is_starting() || !managed.take_requeue_request() {
                    continue;
                }
            }
            self.requeue(&managed).await;
        }
    }

    /// Move a task one place. Returns whether it moved.
    pub async fn shift_task(
        &self,
        id: &str,
        direction: ShiftDirection,
        allow_priority_change: bool,
    ) -> Result<bool> {
        let moved = {
            let mut queue = self.inner.queue.lock();
            let key = queue.key(id)?;
            queue.list.shift(key, direction, allow_priority_change)
        };
        if moved {
            debug!(manager = %self.label(), task_id = %id, %direction, "Task shifted");
            self.reordered().await;
        }
        Ok(moved)
    }

    pub async fn change_task_priority(
        &self,
        id: &str,
        priority: i64,
        position: impl Into<Position>,
    ) -> Result<()> {
        {
            let mut queue = self.inner.queue.lock();
            let key = queue.key(id)?;
            queue.list.change_priority(key, priority, position.into());
        }
        debug!(manager = %self.label(), task_id = %id, priority, "Task priority changed");
        self.reordered().await;
        Ok(())
    }

    /// Move a task to an absolute queue position.
    pub async fn change_task_position(
        &self,
        id: &str,
        position: usize,
        priority_hint: Option<i64>,
    ) -> Result<()> {
        {
            let mut queue = self.inner.queue.lock();
            let key = queue.key(id)?;
            queue
                .list
                .insert_item_at_position(key, position, priority_hint);
        }
        debug!(manager = %self.label(), task_id = %id, position, "Task moved");
        self.reordered().await;
        Ok(())
    }

    pub async fn set_concurrent_tasks(&self, concurrent_tasks: usize) {
        let previous = {
            let mut config = self.inner.config.write();
            std::mem::replace(&mut config.concurrent_tasks, concurrent_tasks)
        };
        info!(
            manager = %self.label(),
            previous,
            concurrent_tasks,
            "Concurrency limit changed"
        );
        self.rebalance().await;
    }

    pub async fn pause_task(&self, id: &str) -> Result<()> {
        let managed = self.find(id)?;
        if !managed.capabilities().pause {
            return Err(Error::unsupported(id, "pause"));
        }
        managed.task().pause().await?;
        self.start_eligible_tasks().await;
        Ok(())
    }

    /// Release a user-paused task back to the scheduler. It resumes once it
    /// is inside the concurrency window and a slot is free.
    pub async fn resume_task(&self, id: &str) -> Result<()> {
        let managed = self.find(id)?;
        if !managed.capabilities().resume {
            return Err(Error::unsupported(id, "resume"));
        }
        if managed.is_force_run() || managed.state() != TaskState::Paused {
            managed.task().resume().await?;
        } else {
            managed.task().requeue().await?;
            debug!(manager = %self.label(), task_id = %id, "Paused task handed back to the scheduler");
        }
        self.rebalance().await;
        Ok(())
    }

    /// Cancel a task. Queued tasks that never started need no capability.
    pub async fn cancel_task(&self, id: &str) -> Result<()> {
        let managed = self.find(id)?;
        let state = managed.state();
        if !managed.capabilities().cancel && (state.is_active() || state == TaskState::Paused) {
            return Err(Error::unsupported(id, "cancel"));
        }
        managed.task().cancel().await
    }

    /// Start a task now, outside the concurrency limit and queue order.
    pub async fn force_start_task(&self, id: &str) -> Result<()> {
        let managed = self.find(id)?;
        if managed.state() == TaskState::Paused && !managed.capabilities().resume {
            return Err(Error::unsupported(id, "resume"));
        }

        managed.set_force_run(true);
        info!(manager = %self.label(), task_id = %id, "Force-starting task");
        match managed.state() {
            TaskState::Idle | TaskState::Paused => {
                self.start_managed(&managed).await;
            }
            TaskState::AwaitingRetry => {
                managed.set_retry_ready(true);
                self.start_managed(&managed).await;
            }
            _ => {}
        }
        // The task no longer counts against the limit.
        self.start_eligible_tasks().await;
        Ok(())
    }

    /// Run a finished failed or cancelled task again.
    pub async fn retry_task(&self, id: &str) -> Result<()> {
        let managed = self.find(id)?;
        let state = managed.state();
        if !matches!(state, TaskState::Failed | TaskState::Cancelled) {
            return Err(Error::unhandled(state, "retry"));
        }

        managed.set_retry_ready(true);
        managed.reset_attempts();
        managed.task().prepare_retry().await?;
        if managed.reopen() {
            self.inner.unfinished.send_modify(|n| *n += 1);
        }
        info!(manager = %self.label(), task_id = %id, "Retrying task on request");
        self.start_eligible_tasks().await;
        Ok(())
    }

    /// Drop a task from the queue, cancelling it if it has not finished.
    pub async fn remove_task(&self, id: &str) -> Result<Arc<ManagedTask>> {
        let managed = {
            let mut queue = self.inner.queue.lock();
            let key = queue.key(id)?;
            queue.index.remove(id);
            queue
                .list
                .remove_item(key)
                .ok_or_else(|| Error::task_not_found(id))?
        };
        self.retire(&managed).await;
        self.start_eligible_tasks().await;
        Ok(managed)
    }

    /// Drop every task, cancelling the unfinished ones.
    pub async fn clear_tasks(&self) {
        let removed = {
            let mut queue = self.inner.queue.lock();
            queue.index.clear();
            queue.list.drain()
        };
        info!(manager = %self.label(), count = removed.len(), "Clearing all tasks");
        for managed in &removed {
            self.retire(managed).await;
        }
    }

    /// Drop every task that has a final result. Returns how many were dropped.
    pub fn clear_completed_tasks(&self) -> usize {
        let removed = {
            let mut queue = self.inner.queue.lock();
            let removed = queue.list.retain(|m| !m.is_finished());
            for managed in &removed {
                queue.index.remove(managed.id());
            }
            removed
        };
        for managed in &removed {
            self.detach(managed);
        }
        if !removed.is_empty() {
            debug!(manager = %self.label(), count = removed.len(), "Cleared completed tasks");
        }
        removed.len()
    }

    /// Resolves once every queued task has a final result.
    pub async fn wait_for_all_tasks(&self) {
        let mut unfinished = self.inner.unfinished.subscribe();
        let _ = unfinished.wait_for(|n| *n == 0).await;
    }

    fn find(&self, id: &str) -> Result<Arc<ManagedTask>> {
        self.get_task(id).ok_or_else(|| Error::task_not_found(id))
    }

    fn emit(&self, event: TaskManagerEvent) {
        let _ = self.inner.events.send(event);
    }

    async fn reordered(&self) {
        self.emit(TaskManagerEvent::QueueReordered {
            manager: self.label().to_string(),
        });
        self.rebalance().await;
    }

    async fn rebalance(&self) {
        self.reassess_running_tasks().await;
        self.start_eligible_tasks().await;
    }

    /// Call `start` under the task's claim. Returns whether it was called.
    async fn start_managed(&self, managed: &Arc<ManagedTask>) -> bool {
        if !managed.try_claim() {
            debug!(manager = %self.label(), task_id = %managed.id(), "Task is already being started");
            return false;
        }
        debug!(
            manager = %self.label(),
            task_id = %managed.id(),
            state = %managed.state(),
            force_run = managed.is_force_run(),
            "Starting task"
        );
        let resuming = managed.state() == TaskState::Paused;
        let result = managed.task().start().await;

        let stalled = resuming
            && managed.state() == TaskState::Paused
            && managed.task().pause_trigger() == Some(PauseTrigger::Requeue);
        if stalled {
            // Back off before the scheduler tries the resume control again.
            self.defer_restart(managed);
        }
        managed.release_claim();

        if managed.take_requeue_request() {
            self.requeue(managed).await;
        }

        if let Err(e) = result {
            warn!(manager = %self.label(), task_id = %managed.id(), error = %e, "Task refused to start");
            return false;
        }
        !stalled
    }

    /// Requeue a running task. Returns whether it gave its slot back.
    async fn requeue(&self, managed: &Arc<ManagedTask>) -> bool {
        if managed.state() != TaskState::Running {
            return false;
        }
        debug!(
            manager = %self.label(),
            task_id = %managed.id(),
            "Requeueing task outside the concurrency window"
        );
        match managed.task().requeue().await {
            Ok(()) => true,
            Err(e) => {
                warn!(manager = %self.label(), task_id = %managed.id(), error = %e, "Requeue failed");
                false
            }
        }
    }

    /// Keep a task out of the window for one retry delay, then rescan.
    fn defer_restart(&self, managed: &Arc<ManagedTask>) {
        managed.set_retry_ready(false);
        warn!(
            manager = %self.label(),
            task_id = %managed.id(),
            "Task did not resume, trying again later"
        );
        let weak = Arc::downgrade(&self.inner);
        let deferred = Arc::clone(managed);
        managed.retry_context().schedule(1, async move {
            deferred.set_retry_ready(true);
            if let Some(inner) = weak.upgrade() {
                TaskManager { inner }.start_eligible_tasks().await;
            }
        });
    }

    fn spawn_listener(&self, managed: Arc<ManagedTask>, mut events: broadcast::Receiver<TaskEvent>) {
        let weak = Arc::downgrade(&self.inner);
        let detached = managed.detached().clone();
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = detached.cancelled() => break,
                    event = events.recv() => match event {
                        Ok(event) => event,
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(task_id = %managed.id(), skipped, "Task event listener lagged");
                            continue;
                        }
                        Err(RecvError::Closed) => break,
                    },
                };
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                TaskManager { inner }.on_task_event(&managed, event).await;
            }
        });
    }

    async fn on_task_event(&self, managed: &Arc<ManagedTask>, event: TaskEvent) {
        managed.publish(event.clone());
        match event {
            TaskEvent::StateChanged { task_id, state } => {
                if state == TaskState::Running {
                    managed.mark_started();
                }
                self.emit(TaskManagerEvent::TaskStateChanged {
                    manager: self.label().to_string(),
                    task_id,
                    state,
                });
                // A slot may have opened up.
                if !state.is_active() && !state.is_terminal() {
                    self.start_eligible_tasks().await;
                }
            }
            TaskEvent::Completed { result, .. } => self.handle_completion(managed, result).await,
        }
    }

    async fn handle_completion(&self, managed: &Arc<ManagedTask>, result: TaskResult) {
        let TaskResult::Failed { error } = &result else {
            self.finalize(managed, result).await;
            return;
        };
        if !managed.retry_context().should_retry(managed.attempt()) {
            self.finalize(managed, result).await;
            return;
        }

        let attempt = managed.next_attempt();
        let delay = managed.retry_context().delay_for_attempt(attempt);
        managed.set_retry_ready(false);
        warn!(
            manager = %self.label(),
            task_id = %managed.id(),
            attempt,
            max_retries = managed.retry_context().max_retries(),
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Task failed, scheduling retry"
        );
        self.emit(TaskManagerEvent::TaskRetrying {
            manager: self.label().to_string(),
            task_id: managed.id().to_string(),
            attempt,
            error: error.clone(),
            delay_ms: delay.as_millis() as u64,
        });

        if let Err(e) = managed.task().prepare_retry().await {
            warn!(manager = %self.label(), task_id = %managed.id(), error = %e, "Could not prepare retry");
            self.finalize(managed, result).await;
            return;
        }

        let weak = Arc::downgrade(&self.inner);
        let retried = Arc::clone(managed);
        managed.retry_context().schedule(attempt, async move {
            retried.set_retry_ready(true);
            if let Some(inner) = weak.upgrade() {
                TaskManager { inner }.start_eligible_tasks().await;
            }
        });
    }

    async fn finalize(&self, managed: &Arc<ManagedTask>, result: TaskResult) {
        if !managed.finish(result.clone()) {
            return;
        }
        self.inner.unfinished.send_modify(|n| *n = n.saturating_sub(1));

        info!(
            manager = %self.label(),
            task_id = %managed.id(),
            status = %result.state(),
            retries = managed.attempt(),
            "Task finished"
        );
        self.emit(TaskManagerEvent::TaskFinished {
            manager: self.label().to_string(),
            task_id: managed.id().to_string(),
            result,
        });

        let auto_clear = self.inner.config.read().auto_clear_completed_tasks;
        if auto_clear && self.inner.queue.lock().take(managed) {
            self.detach(managed);
        }
        self.start_eligible_tasks().await;
    }

    /// Stop listening to a task that left the queue.
    fn detach(&self, managed: &Arc<ManagedTask>) {
        managed.detached().cancel();
        self.emit(TaskManagerEvent::TaskRemoved {
            manager: self.label().to_string(),
            task_id: managed.id().to_string(),
        });
    }

    /// Detach a removed task and settle it as cancelled if it never finished.
    async fn retire(&self, managed: &Arc<ManagedTask>) {
        self.detach(managed);
        if managed.is_finished() {
            return;
        }

        let state = managed.state();
        let cancellable =
            managed.capabilities().cancel || !(state.is_active() || state == TaskState::Paused);
        if cancellable
            && !state.is_terminal()
            && let Err(e) = managed.task().cancel().await
        {
            debug!(manager = %self.label(), task_id = %managed.id(), error = %e, "Cancel on removal failed");
        }
        if managed.finish(TaskResult::Cancelled) {
            self.inner.unfinished.send_modify(|n| *n = n.saturating_sub(1));
        }
    }
}

/// Items competing for the concurrency window.
fn in_window(managed: &Arc<ManagedTask>) -> bool {
    !managed.is_force_run() && (managed.is_occupying() || managed.is_startable())
}

impl std::fmt::Debug for TaskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskManager")
            .field("label", &self.inner.label)
            .field("tasks", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::task::{BoxError, ControllableTask, TaskContext, TaskControls};
    use async_trait::async_trait;
    use tokio::sync::Notify;

    struct Blocked(Arc<Notify>);

    #[async_trait]
    impl TaskControls for Blocked {
        async fn start(&self, _ctx: &TaskContext) -> std::result::Result<TaskResult, BoxError> {
            self.0.notified().await;
            Ok(TaskResult::success(None))
        }
    }

    fn task(id: &str, gate: &Arc<Notify>) -> Arc<dyn Task> {
        Arc::new(ControllableTask::new(id, Blocked(gate.clone())))
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let manager = TaskManager::new(TaskManagerConfig::new("dup", 1)).unwrap();
        let gate = Arc::new(Notify::new());
        manager.add_task(task("a", &gate), AddTaskOptions::new()).await.unwrap();

        let err = manager
            .add_task(task("a", &gate), AddTaskOptions::new())
            .await
            .unwrap_err();
        assert_eq!(err, Error::DuplicateTask { id: "a".into() });
        assert_eq!(manager.len(), 1);
    }

    #[tokio::test]
    async fn test_window_skips_running_tasks_outside_it() {
        let manager = TaskManager::new(TaskManagerConfig::new("window", 2)).unwrap();
        let gate = Arc::new(Notify::new());

        manager
            .add_task(task("low", &gate), AddTaskOptions::new().with_priority(5))
            .await
            .unwrap();
        assert_eq!(manager.running_count(), 1);

        manager
            .add_task(task("mid", &gate), AddTaskOptions::new().with_priority(3))
            .await
            .unwrap();
        manager
            .add_task(task("high", &gate), AddTaskOptions::new().with_priority(1))
            .await
            .unwrap();

        assert_eq!(manager.running_count(), 2);
        assert_eq!(manager.get_task("high").unwrap().state(), TaskState::Idle);
        assert!(manager.get_eligible_startable_tasks().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_ids_are_reported() {
        let manager = TaskManager::new(TaskManagerConfig::default()).unwrap();
        assert_eq!(
            manager.pause_task("nope").await.unwrap_err(),
            Error::task_not_found("nope")
        );
        assert!(manager.get_task_position_info("nope").is_none());
        assert!(matches!(
            manager.change_task_priority("nope", 1, Position::Last).await,
            Err(Error::TaskNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let config = TaskManagerConfig::new("", 1).with_retries(RetryConfig::no_retry());
        assert!(TaskManager::new(config).is_err());
    }
}
