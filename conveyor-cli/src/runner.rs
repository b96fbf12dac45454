//! Builds managers and pipelines from a plan and runs them to completion.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use conveyor::{
    AddTaskOptions, ControllableTask, PipelineEvent, PipelineExecution, PipelineExecutionResult,
    PipelineRegistry, PipelineStatus, PipelineStep, Task, TaskManager,
};
use futures::future::join_all;
use serde::Serialize;
use serde_json::{Map, Value, json};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::plan::{PipelinePlan, Plan, StepPlan};
use crate::sim::Simulated;

const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// Outcome of every pipeline in a plan, in plan order.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub pipelines: Vec<PipelineExecutionResult>,
}

impl Report {
    pub fn failures(&self) -> usize {
        self.pipelines
            .iter()
            .filter(|result| result.status != PipelineStatus::Success)
            .count()
    }

    pub fn summary(&self) -> String {
        let mut out = String::new();
        for result in &self.pipelines {
            let _ = write!(out, "{}: {}", result.pipeline_id, result.status);
            if let Some(error) = &result.error {
                let _ = write!(out, " ({error})");
            } else if let Some(value) = &result.result {
                let _ = write!(out, " -> {value}");
            }
            out.push('\n');
        }
        let _ = writeln!(
            out,
            "{} of {} pipelines succeeded",
            self.pipelines.len() - self.failures(),
            self.pipelines.len()
        );
        out
    }
}

/// Run every pipeline of `plan` concurrently. Ctrl-C cancels them all.
pub async fn run_plan(plan: &Plan) -> Result<Report> {
    plan.validate()?;

    let mut managers = HashMap::new();
    for config in &plan.managers {
        let manager = TaskManager::new(config.clone())
            .with_context(|| format!("failed to create manager '{}'", config.label))?;
        managers.insert(config.label.clone(), manager);
    }

    let registry = PipelineRegistry::new();
    let mut pipelines = Vec::with_capacity(plan.pipelines.len());
    for pipeline_plan in &plan.pipelines {
        let pipeline = build_pipeline(pipeline_plan, &managers)?;
        registry.insert(pipeline.clone());
        pipelines.push(pipeline);
    }

    let watchers: Vec<JoinHandle<()>> = pipelines.iter().map(watch_events).collect();
    let progress = tokio::spawn(report_progress(registry.clone()));
    let interrupt = tokio::spawn(cancel_on_interrupt(registry.clone()));

    info!(
        managers = managers.len(),
        pipelines = pipelines.len(),
        "Running plan"
    );
    for pipeline in &pipelines {
        pipeline.start()?;
    }
    let results = join_all(pipelines.iter().map(|pipeline| pipeline.await_result())).await;

    progress.abort();
    interrupt.abort();
    for watcher in watchers {
        let _ = watcher.await;
    }
    registry.remove_finished();

    Ok(Report { pipelines: results })
}

fn build_pipeline(
    plan: &PipelinePlan,
    managers: &HashMap<String, TaskManager>,
) -> Result<PipelineExecution<String>> {
    let mut builder = PipelineExecution::builder(plan.id.clone()).id(plan.id.clone());
    for (index, step) in plan.steps.iter().enumerate() {
        let manager = managers
            .get(&step.manager)
            .with_context(|| format!("unknown manager '{}'", step.manager))?;
        builder = builder.step(build_step(index, step, manager));
    }

    Ok(builder
        .reduce_results(|steps, _, payloads| {
            let by_name: Map<String, Value> = steps
                .iter()
                .zip(payloads)
                .map(|(step, payload)| {
                    (
                        step.name().to_string(),
                        payload.clone().unwrap_or(Value::Null),
                    )
                })
                .collect();
            Some(Value::Object(by_name))
        })
        .build())
}

fn build_step(index: usize, plan: &StepPlan, manager: &TaskManager) -> PipelineStep<String> {
    let mut options = AddTaskOptions::new();
    if let Some(priority) = plan.priority {
        options = options.with_priority(priority);
    }
    if plan.force_run {
        options = options.force_run();
    }

    let step = plan.clone();
    PipelineStep::new(
        plan.name.clone(),
        manager.clone(),
        move |pipeline_id: &String, previous: Option<&Value>, _: &[Option<Value>]| {
            if step.skip {
                return None;
            }
            let output = step
                .output
                .clone()
                .unwrap_or_else(|| json!({ "step": step.name, "input": previous }));
            let controls = Simulated::new(&step.name, Duration::from_millis(step.duration_ms))
                .with_failures(step.fail_times)
                .with_output(Some(output));
            let task: Arc<dyn Task> = Arc::new(ControllableTask::new(
                format!("{pipeline_id}/{index}-{}", step.name),
                controls,
            ));
            Some(task)
        },
    )
    .with_continue_on_fail(plan.continue_on_fail)
    .with_continue_on_cancel(plan.continue_on_cancel)
    .with_options(options)
}

fn watch_events(pipeline: &PipelineExecution<String>) -> JoinHandle<()> {
    let mut events = pipeline.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(PipelineEvent::Started { pipeline_id }) => {
                    debug!(%pipeline_id, "Pipeline running");
                }
                Ok(PipelineEvent::StepTaskStarted {
                    pipeline_id,
                    step_name,
                    task_id,
                    ..
                }) => {
                    info!(%pipeline_id, step = %step_name, %task_id, "Step started");
                }
                Ok(PipelineEvent::StepCompleted {
                    pipeline_id,
                    step_name,
                    outcome,
                    ..
                }) => {
                    info!(%pipeline_id, step = %step_name, ?outcome, "Step completed");
                }
                Ok(PipelineEvent::Completed { .. }) => break,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Pipeline event watcher lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

async fn report_progress(registry: PipelineRegistry<String>) {
    let mut ticker = tokio::time::interval(PROGRESS_INTERVAL);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        for id in registry.ids() {
            if let Some(pipeline) = registry.get(&id)
                && pipeline.status() == PipelineStatus::Running
            {
                info!(pipeline_id = %id, status = %pipeline.generate_status_message(), "Progress");
            }
        }
    }
}

async fn cancel_on_interrupt(registry: PipelineRegistry<String>) {
    if tokio::signal::ctrl_c().await.is_err() {
        return;
    }
    warn!("Interrupted, cancelling pipelines");
    for id in registry.ids() {
        if let Err(e) = registry.cancel(&id).await {
            warn!(pipeline_id = %id, error = %e, "Failed to cancel pipeline");
        }
    }
}
