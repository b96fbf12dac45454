//! Multi-step pipelines on top of one or more task managers.
//!
//! A [`PipelineExecution`] walks its [`PipelineStep`]s in order. Each step
//! creates its task only when reached, queues it on the step's manager, and
//! hands the task's payload to the next step. Failed or cancelled steps end
//! the pipeline unless the step is configured to continue.

mod events;
mod execution;
mod registry;
mod step;

pub use events::PipelineEvent;
pub use execution::{
    PipelineBuilder, PipelineExecution, PipelineExecutionResult, PipelineStatus, ResultReducer,
    StatusMessageFn, StepInfo, StepOutcome,
};
pub use registry::{PipelineRegistry, StepControl};
pub use step::{PipelineStep, TaskCreator};
