//! Simulated step work.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use conveyor::{BoxError, Cancellable, Pausable, TaskContext, TaskControls, TaskResult};
use serde_json::{Value, json};
use tokio::sync::watch;

const TICKS: u32 = 10;

/// Sleeps through its duration in ticks, honouring pause and cancel between
/// ticks. The first `fail_times` attempts fail.
pub struct Simulated {
    name: String,
    duration: Duration,
    failures_left: AtomicU32,
    output: Option<Value>,
    paused: watch::Sender<bool>,
    progress: AtomicU32,
}

impl Simulated {
    pub fn new(name: impl Into<String>, duration: Duration) -> Self {
        Self {
            name: name.into(),
            duration,
            failures_left: AtomicU32::new(0),
            output: None,
            paused: watch::Sender::new(false),
            progress: AtomicU32::new(0),
        }
    }

    pub fn with_failures(self, fail_times: u32) -> Self {
        self.failures_left.store(fail_times, Ordering::SeqCst);
        self
    }

    pub fn with_output(mut self, output: Option<Value>) -> Self {
        self.output = output;
        self
    }

    fn progress(&self) -> u32 {
        self.progress.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskControls for Simulated {
    async fn start(&self, ctx: &TaskContext) -> Result<TaskResult, BoxError> {
        self.progress.store(0, Ordering::SeqCst);
        let tick = self.duration / TICKS;
        let token = ctx.cancellation_token();
        let mut paused = self.paused.subscribe();

        for done in 1..=TICKS {
            tokio::select! {
                _ = token.cancelled() => return Ok(TaskResult::Cancelled),
                waited = paused.wait_for(|paused| !*paused) => {
                    waited?;
                }
            }
            tokio::select! {
                _ = token.cancelled() => return Ok(TaskResult::Cancelled),
                _ = tokio::time::sleep(tick) => {}
            }
            self.progress.store(done * 100 / TICKS, Ordering::SeqCst);
        }

        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failed {
            return Ok(TaskResult::failed(format!(
                "{}: simulated failure on attempt {}",
                self.name,
                ctx.attempt()
            )));
        }
        Ok(TaskResult::success(Some(
            self.output.clone().unwrap_or_else(|| json!(self.name)),
        )))
    }

    async fn cleanup(&self, _ctx: &TaskContext) -> Result<(), BoxError> {
        self.progress.store(0, Ordering::SeqCst);
        self.paused.send_replace(false);
        Ok(())
    }

    fn status(&self, _ctx: &TaskContext) -> Option<Value> {
        Some(json!({ "progress": self.progress() }))
    }

    fn status_message(&self, _ctx: &TaskContext) -> Option<String> {
        Some(format!("{}: {}%", self.name, self.progress()))
    }

    fn as_pausable(&self) -> Option<&dyn Pausable> {
        Some(self)
    }

    fn as_cancellable(&self) -> Option<&dyn Cancellable> {
        Some(self)
    }
}

#[async_trait]
impl Pausable for Simulated {
    async fn pause(&self, _ctx: &TaskContext) -> Result<(), BoxError> {
        self.paused.send_replace(true);
        Ok(())
    }

    async fn resume(&self, _ctx: &TaskContext) -> Result<(), BoxError> {
        self.paused.send_replace(false);
        Ok(())
    }
}

#[async_trait]
impl Cancellable for Simulated {
    async fn cancel(&self, _ctx: &TaskContext) -> Result<(), BoxError> {
        // The token is already cancelled; the tick loop notices it.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conveyor::{ControllableTask, Task, TaskEvent, TaskState};

    #[tokio::test(start_paused = true)]
    async fn test_fails_then_succeeds() {
        let task = ControllableTask::new(
            "sim",
            Simulated::new("sim", Duration::from_millis(100))
                .with_failures(1)
                .with_output(Some(json!("out"))),
        );
        let mut events = task.subscribe();

        task.start().await.unwrap();
        assert_eq!(task.status_message().as_deref(), Some("sim: 0%"));
        let result = loop {
            if let TaskEvent::Completed { result, .. } = events.recv().await.unwrap() {
                break result;
            }
        };
        assert!(result.is_failed());
        assert_eq!(task.state(), TaskState::Failed);

        task.prepare_retry().await.unwrap();
        task.start().await.unwrap();
        let result = loop {
            if let TaskEvent::Completed { result, .. } = events.recv().await.unwrap() {
                break result;
            }
        };
        assert_eq!(result.result(), Some(&json!("out")));
        assert_eq!(task.status_message().as_deref(), Some("sim: 100%"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_holds_progress() {
        let task = ControllableTask::new("sim", Simulated::new("sim", Duration::from_millis(100)));
        task.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(35)).await;
        task.pause().await.unwrap();
        assert_eq!(task.state(), TaskState::Paused);

        // The tick in flight still lands, then the loop waits.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let held = task.status().unwrap()["progress"].as_u64().unwrap();
        assert!(held < 100);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(task.status().unwrap()["progress"].as_u64(), Some(held));

        task.resume().await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(task.state(), TaskState::Success);
    }
}
