//! Events published by a [`PipelineExecution`](super::PipelineExecution).

use serde::Serialize;

use super::{PipelineExecutionResult, StepOutcome};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    Started {
        pipeline_id: String,
    },
    /// The task of a step reached `running` for the first time.
    StepTaskStarted {
        pipeline_id: String,
        step_index: usize,
        step_name: String,
        task_id: String,
    },
    StepCompleted {
        pipeline_id: String,
        step_index: usize,
        step_name: String,
        outcome: StepOutcome,
    },
    Completed {
        pipeline_id: String,
        result: PipelineExecutionResult,
    },
}

impl PipelineEvent {
    pub fn pipeline_id(&self) -> &str {
        match self {
            Self::Started { pipeline_id }
            | Self::StepTaskStarted { pipeline_id, .. }
            | Self::StepCompleted { pipeline_id, .. }
            | Self::Completed { pipeline_id, .. } => pipeline_id,
        }
    }
}
