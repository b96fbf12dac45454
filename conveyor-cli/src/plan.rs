//! Declarative plan files.
//!
//! A plan names the task managers to create and the pipelines to run on
//! them. Every step is a simulated task whose duration, failures and output
//! are set in the plan.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result, bail};
use conveyor::{RetryConfig, TaskManagerConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default, rename = "manager")]
    pub managers: Vec<TaskManagerConfig>,
    #[serde(default, rename = "pipeline")]
    pub pipelines: Vec<PipelinePlan>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelinePlan {
    pub id: String,
    #[serde(default, rename = "step")]
    pub steps: Vec<StepPlan>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepPlan {
    pub name: String,
    /// Label of the manager that runs this step.
    pub manager: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    #[serde(default)]
    pub force_run: bool,
    /// How long one attempt runs.
    #[serde(default = "default_duration_ms")]
    pub duration_ms: u64,
    /// Number of attempts that fail before one succeeds.
    #[serde(default)]
    pub fail_times: u32,
    /// Do not create a task for this step.
    #[serde(default)]
    pub skip: bool,
    /// Payload of a successful attempt. Defaults to the step name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default)]
    pub continue_on_fail: bool,
    #[serde(default)]
    pub continue_on_cancel: bool,
}

fn default_duration_ms() -> u64 {
    200
}

impl StepPlan {
    pub fn new(name: impl Into<String>, manager: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            manager: manager.into(),
            priority: None,
            force_run: false,
            duration_ms: default_duration_ms(),
            fail_times: 0,
            skip: false,
            output: None,
            continue_on_fail: false,
            continue_on_cancel: false,
        }
    }
}

impl Plan {
    /// Read, parse and validate a plan file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read plan {}", path.display()))?;
        let plan = Self::parse(&content)
            .with_context(|| format!("invalid plan {}", path.display()))?;
        Ok(plan)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let plan: Self = toml::from_str(content)?;
        plan.validate()?;
        Ok(plan)
    }

    pub fn validate(&self) -> Result<()> {
        let mut labels = HashSet::new();
        for config in &self.managers {
            config
                .validate()
                .with_context(|| format!("manager '{}'", config.label))?;
            if !labels.insert(config.label.as_str()) {
                bail!("duplicate manager '{}'", config.label);
            }
        }

        let mut ids = HashSet::new();
        for pipeline in &self.pipelines {
            if pipeline.id.trim().is_empty() {
                bail!("pipeline id must not be empty");
            }
            if !ids.insert(pipeline.id.as_str()) {
                bail!("duplicate pipeline '{}'", pipeline.id);
            }
            for step in &pipeline.steps {
                if !labels.contains(step.manager.as_str()) {
                    bail!(
                        "step '{}' of pipeline '{}' uses unknown manager '{}'",
                        step.name,
                        pipeline.id,
                        step.manager
                    );
                }
            }
        }
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// A small plan showing every option.
    pub fn example() -> Self {
        let downloads = TaskManagerConfig::new("downloads", 2).with_retries(RetryConfig {
            max_retries: 2,
            retry_delay_ms: 500,
            retry_delay_multiplier: 2.0,
            max_delay_ms: Some(5000),
        });
        let uploads = TaskManagerConfig::new("uploads", 1).with_auto_clear(true);

        let recording = |id: &str, priority: i64| PipelinePlan {
            id: id.to_string(),
            steps: vec![
                StepPlan {
                    priority: Some(priority),
                    fail_times: 1,
                    output: Some(Value::from(format!("{id}.flv"))),
                    ..StepPlan::new("download", "downloads")
                },
                StepPlan {
                    continue_on_fail: true,
                    ..StepPlan::new("remux", "downloads")
                },
                StepPlan::new("upload", "uploads"),
            ],
        };

        Self {
            managers: vec![downloads, uploads],
            pipelines: vec![recording("stream-a", 1), recording("stream-b", 5)],
        }
    }
}
