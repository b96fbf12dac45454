//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use conveyor::{
    BoxError, Cancellable, ControllableTask, Pausable, Task, TaskContext, TaskControls, TaskResult,
};
use parking_lot::Mutex;
use tokio::sync::{Semaphore, watch};

/// Initialize tracing for tests.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Tracks how many task bodies run at once.
#[derive(Debug, Default)]
pub struct Occupancy {
    current: AtomicUsize,
    max: AtomicUsize,
}

impl Occupancy {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    pub fn max(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }

    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Releases gated task bodies, one permit per body.
#[derive(Debug, Clone)]
pub struct Gate(Arc<Semaphore>);

impl Gate {
    pub fn new() -> Self {
        Self(Arc::new(Semaphore::new(0)))
    }

    pub fn release(&self, n: usize) {
        self.0.add_permits(n);
    }
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}

/// Test controls with scripted outcomes.
///
/// Each start pops the next scripted result (success without payload once the
/// script runs out). With a gate the body waits for a permit first. While
/// paused the body holds its result back.
pub struct Scripted {
    outcomes: Mutex<VecDeque<TaskResult>>,
    gate: Option<Gate>,
    occupancy: Option<Arc<Occupancy>>,
    delay: Option<Duration>,
    pausable: bool,
    cancellable: bool,
    paused: watch::Sender<bool>,
    message: Mutex<Option<String>>,
    resume_delay: Option<Duration>,
    resume_failures: AtomicU32,
    pub starts: AtomicU32,
    pub cleanups: AtomicU32,
    pub pauses: AtomicU32,
    pub resumes: AtomicU32,
}

impl Scripted {
    pub fn new() -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::new()),
            gate: None,
            occupancy: None,
            delay: None,
            pausable: true,
            cancellable: true,
            paused: watch::Sender::new(false),
            message: Mutex::new(None),
            resume_delay: None,
            resume_failures: AtomicU32::new(0),
            starts: AtomicU32::new(0),
            cleanups: AtomicU32::new(0),
            pauses: AtomicU32::new(0),
            resumes: AtomicU32::new(0),
        }
    }

    pub fn succeeding(payload: serde_json::Value) -> Self {
        Self::new().outcome(TaskResult::success(Some(payload)))
    }

    pub fn failing(error: &str) -> Self {
        Self::new().outcome(TaskResult::failed(error))
    }

    pub fn outcome(self, outcome: TaskResult) -> Self {
        self.outcomes.lock().push_back(outcome);
        self
    }

    /// Fail every one of the first `times` attempts.
    pub fn fail_times(self, times: usize, error: &str) -> Self {
        for _ in 0..times {
            self.outcomes.lock().push_back(TaskResult::failed(error));
        }
        self
    }

    pub fn gated(mut self, gate: &Gate) -> Self {
        self.gate = Some(gate.clone());
        self
    }

    pub fn tracked(mut self, occupancy: &Arc<Occupancy>) -> Self {
        self.occupancy = Some(Arc::clone(occupancy));
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn without_pause(mut self) -> Self {
        self.pausable = false;
        self
    }

    pub fn without_cancel(mut self) -> Self {
        self.cancellable = false;
        self
    }

    /// The resume control takes `delay` to settle.
    pub fn slow_resume(mut self, delay: Duration) -> Self {
        self.resume_delay = Some(delay);
        self
    }

    /// The first `times` resume calls fail.
    pub fn failing_resumes(self, times: u32) -> Self {
        self.resume_failures.store(times, Ordering::SeqCst);
        self
    }

    pub fn resumes(&self) -> u32 {
        self.resumes.load(Ordering::SeqCst)
    }

    pub fn with_message(self, message: &str) -> Self {
        *self.message.lock() = Some(message.to_string());
        self
    }

    pub fn starts(&self) -> u32 {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn into_task(self, id: &str) -> (Arc<Self>, Arc<dyn Task>) {
        let controls = Arc::new(self);
        let task: Arc<dyn Task> = Arc::new(ControllableTask::from_arc(id, controls.clone()));
        (controls, task)
    }

    async fn body(&self, ctx: &TaskContext) -> TaskResult {
        if let Some(gate) = &self.gate {
            tokio::select! {
                permit = gate.0.acquire() => match permit {
                    Ok(permit) => permit.forget(),
                    Err(_) => return TaskResult::failed("gate closed"),
                },
                _ = ctx.cancellation_token().cancelled() => return TaskResult::Cancelled,
            }
        }
        if let Some(delay) = self.delay {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = ctx.cancellation_token().cancelled() => return TaskResult::Cancelled,
            }
        }

        let mut paused = self.paused.subscribe();
        tokio::select! {
            _ = paused.wait_for(|p| !*p) => {}
            _ = ctx.cancellation_token().cancelled() => return TaskResult::Cancelled,
        }

        self.outcomes
            .lock()
            .pop_front()
            .unwrap_or(TaskResult::success(None))
    }
}

impl Default for Scripted {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskControls for Scripted {
    async fn start(&self, ctx: &TaskContext) -> Result<TaskResult, BoxError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if let Some(occupancy) = &self.occupancy {
            occupancy.enter();
        }
        let result = self.body(ctx).await;
        if let Some(occupancy) = &self.occupancy {
            occupancy.exit();
        }
        Ok(result)
    }

    async fn cleanup(&self, _ctx: &TaskContext) -> Result<(), BoxError> {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn status_message(&self, _ctx: &TaskContext) -> Option<String> {
        self.message.lock().clone()
    }

    fn as_pausable(&self) -> Option<&dyn Pausable> {
        if self.pausable { Some(self) } else { None }
    }

    fn as_cancellable(&self) -> Option<&dyn Cancellable> {
        if self.cancellable { Some(self) } else { None }
    }
}

#[async_trait]
impl Pausable for Scripted {
    async fn pause(&self, _ctx: &TaskContext) -> Result<(), BoxError> {
        self.pauses.fetch_add(1, Ordering::SeqCst);
        self.paused.send_replace(true);
        Ok(())
    }

    async fn resume(&self, _ctx: &TaskContext) -> Result<(), BoxError> {
        self.resumes.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.resume_delay {
            tokio::time::sleep(delay).await;
        }
        let failed = self
            .resume_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failed {
            return Err("resume refused".into());
        }
        self.paused.send_replace(false);
        Ok(())
    }
}

#[async_trait]
impl Cancellable for Scripted {
    async fn cancel(&self, _ctx: &TaskContext) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Poll `condition` until it holds, failing the test after five seconds.
pub async fn eventually(mut condition: impl FnMut() -> bool, what: &str) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
