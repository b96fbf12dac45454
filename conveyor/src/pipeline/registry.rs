//! Lookup of running pipelines by id, with per-step task control.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::PipelineExecution;
use crate::{Error, Result};

/// Control operation applied to the task of a pipeline step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepControl {
    Pause,
    Resume,
    Cancel,
    ForceStart,
    /// Run a failed or cancelled step task again on its manager. The
    /// pipeline's recorded outcome for the step is not revisited.
    Retry,
}

impl fmt::Display for StepControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Cancel => "cancel",
            Self::ForceStart => "force_start",
            Self::Retry => "retry",
        })
    }
}

/// Pipelines indexed by id.
pub struct PipelineRegistry<C> {
    pipelines: Arc<RwLock<HashMap<String, PipelineExecution<C>>>>,
}

impl<C> Clone for PipelineRegistry<C> {
    fn clone(&self) -> Self {
        Self {
            pipelines: Arc::clone(&self.pipelines),
        }
    }
}

impl<C> Default for PipelineRegistry<C> {
    fn default() -> Self {
        Self {
            pipelines: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<C: Send + Sync + 'static> PipelineRegistry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `pipeline`, returning any pipeline previously tracked under its id.
    pub fn insert(&self, pipeline: PipelineExecution<C>) -> Option<PipelineExecution<C>> {
        self.pipelines
            .write()
            .insert(pipeline.id().to_string(), pipeline)
    }

    pub fn get(&self, id: &str) -> Option<PipelineExecution<C>> {
        self.pipelines.read().get(id).cloned()
    }

    pub fn remove(&self, id: &str) -> Option<PipelineExecution<C>> {
        self.pipelines.write().remove(id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.pipelines.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.pipelines.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.read().is_empty()
    }

    /// Forget every pipeline that has a terminal result. Returns how many.
    pub fn remove_finished(&self) -> usize {
        let mut pipelines = self.pipelines.write();
        let before = pipelines.len();
        pipelines.retain(|_, pipeline| pipeline.result().is_none());
        before - pipelines.len()
    }

    /// Cancel a pipeline.
    pub async fn cancel(&self, pipeline_id: &str) -> Result<()> {
        self.lookup(pipeline_id)?.cancel().await
    }

    /// Apply `control` to the task of step `step_index`.
    ///
    /// Fails with [`Error::PipelineNotFound`] for an unknown pipeline and with
    /// [`Error::StepNotFound`] when the step does not exist or has no task
    /// still listed on its manager.
    pub async fn control_step(
        &self,
        pipeline_id: &str,
        step_index: usize,
        control: StepControl,
    ) -> Result<()> {
        let pipeline = self.lookup(pipeline_id)?;
        let step_not_found = || Error::StepNotFound {
            pipeline_id: pipeline_id.to_string(),
            step: step_index.to_string(),
        };

        let (manager, task) = pipeline.step_task(step_index).ok_or_else(step_not_found)?;
        match manager.get_task(task.id()) {
            Some(listed) if Arc::ptr_eq(&listed, &task) => {}
            _ => return Err(step_not_found()),
        }

        debug!(pipeline_id, step = step_index, task_id = %task.id(), %control, "Controlling step task");
        match control {
            StepControl::Pause => manager.pause_task(task.id()).await,
            StepControl::Resume => manager.resume_task(task.id()).await,
            StepControl::Cancel => manager.cancel_task(task.id()).await,
            StepControl::ForceStart => manager.force_start_task(task.id()).await,
            StepControl::Retry => manager.retry_task(task.id()).await,
        }
    }

    fn lookup(&self, pipeline_id: &str) -> Result<PipelineExecution<C>> {
        self.get(pipeline_id).ok_or_else(|| Error::PipelineNotFound {
            id: pipeline_id.to_string(),
        })
    }
}

impl<C> fmt::Debug for PipelineRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineRegistry")
            .field("pipelines", &self.pipelines.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_pipeline_and_step() {
        let registry = PipelineRegistry::<()>::new();
        assert_eq!(
            registry.control_step("missing", 0, StepControl::Pause).await,
            Err(Error::PipelineNotFound {
                id: "missing".into()
            })
        );

        let pipeline = PipelineExecution::new((), Vec::new());
        let id = pipeline.id().to_string();
        assert!(registry.insert(pipeline).is_none());
        assert_eq!(registry.ids(), vec![id.clone()]);

        assert!(matches!(
            registry.control_step(&id, 3, StepControl::Cancel).await,
            Err(Error::StepNotFound { .. })
        ));

        assert!(registry.remove(&id).is_some());
        assert!(registry.is_empty());
    }
}
