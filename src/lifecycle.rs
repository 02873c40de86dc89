//! One test case: init, validate, apply + idempotency check, then destroy on
//! every exit path.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tracing::Instrument;

use crate::terraform::{Options, ResourceCount, Terraform, TerraformError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Init,
    Validate,
    /// Apply followed by an empty-plan check
    Apply,
    Destroy,
}

impl Step {
    /// Setup steps, in execution order. Destroy always follows.
    pub const SETUP: [Step; 3] = [Step::Init, Step::Validate, Step::Apply];

    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Init => "init",
            Step::Validate => "validate",
            Step::Apply => "apply",
            Step::Destroy => "destroy",
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Passed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepOutcome {
    pub step: Step,
    pub status: StepStatus,
    #[serde(rename = "duration_ms", serialize_with = "as_millis")]
    pub duration: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceCount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepOutcome {
    fn skipped(step: Step) -> Self {
        Self {
            step,
            status: StepStatus::Skipped,
            duration: Duration::ZERO,
            resources: None,
            error: None,
        }
    }
}

/// Everything that happened to one case.
#[derive(Debug, Serialize)]
pub struct LifecycleReport {
    pub name: String,
    pub dir: PathBuf,
    pub steps: Vec<StepOutcome>,
    #[serde(skip)]
    failure: Option<(Step, TerraformError)>,
    #[serde(skip)]
    teardown_failure: Option<TerraformError>,
}

impl LifecycleReport {
    pub fn passed(&self) -> bool {
        self.failure.is_none() && self.teardown_failure.is_none()
    }

    pub fn step(&self, step: Step) -> Option<&StepOutcome> {
        self.steps.iter().find(|outcome| outcome.step == step)
    }

    /// First failing setup step and its error.
    pub fn failure(&self) -> Option<(Step, &TerraformError)> {
        self.failure.as_ref().map(|(step, err)| (*step, err))
    }

    pub fn teardown_failure(&self) -> Option<&TerraformError> {
        self.teardown_failure.as_ref()
    }

    /// `Err` when any step, teardown included, failed.
    ///
    /// The setup failure stays the primary error; a teardown failure rides
    /// along in `LifecycleError::teardown`.
    pub fn into_result(mut self) -> Result<Self, LifecycleError> {
        let (step, source, teardown) = match (self.failure.take(), self.teardown_failure.take()) {
            (None, None) => return Ok(self),
            (Some((step, source)), teardown) => (step, source, teardown),
            (None, Some(source)) => (Step::Destroy, source, None),
        };

        Err(LifecycleError {
            case: self.name,
            step,
            source,
            teardown,
        })
    }
}

#[derive(Debug, Error)]
#[error("{case}: {step} failed: {source}{}", teardown_note(.teardown))]
pub struct LifecycleError {
    pub case: String,
    pub step: Step,
    #[source]
    pub source: TerraformError,
    pub teardown: Option<TerraformError>,
}

fn teardown_note(teardown: &Option<TerraformError>) -> String {
    match teardown {
        Some(err) => format!("\n(teardown also failed: {err})"),
        None => String::new(),
    }
}

fn as_millis<S: serde::Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
}

/// Drives one configuration directory through the full lifecycle.
#[derive(Debug, Clone, Default)]
pub struct LifecycleRunner {
    terraform: Terraform,
}

impl LifecycleRunner {
    pub fn new(terraform: Terraform) -> Self {
        Self { terraform }
    }

    pub async fn run(&self, name: &str, options: &Options) -> LifecycleReport {
        let span = tracing::info_span!(
            "case",
            case = name,
            dir = %options.terraform_dir.display()
        );
        self.run_steps(name, options).instrument(span).await
    }

    async fn run_steps(&self, name: &str, options: &Options) -> LifecycleReport {
        let mut steps = Vec::with_capacity(Step::SETUP.len() + 1);
        let mut failure = None;

        for step in Step::SETUP {
            if failure.is_some() {
                steps.push(StepOutcome::skipped(step));
                continue;
            }

            let (outcome, err) = self.timed(step, options).await;
            steps.push(outcome);
            if let Some(err) = err {
                failure = Some((step, err));
            }
        }

        // NOTE: destroy runs unconditionally, even after a failed init
        let (outcome, teardown_failure) = self.timed(Step::Destroy, options).await;
        steps.push(outcome);

        let report = LifecycleReport {
            name: name.to_string(),
            dir: options.terraform_dir.clone(),
            steps,
            failure,
            teardown_failure,
        };

        if report.passed() {
            tracing::info!("case passed");
        } else {
            tracing::error!(
                failed_step = ?report.failure().map(|(step, _)| step),
                teardown_failed = report.teardown_failure.is_some(),
                "case failed"
            );
        }

        report
    }

    async fn timed(&self, step: Step, options: &Options) -> (StepOutcome, Option<TerraformError>) {
        tracing::info!(%step, "starting step");
        let started = Instant::now();

        let result = match step {
            Step::Init => self.terraform.init(options).await,
            Step::Validate => self.terraform.validate(options).await,
            Step::Apply => self.terraform.apply_and_idempotent(options).await,
            Step::Destroy => self.terraform.destroy(options).await,
        };
        let duration = started.elapsed();

        match result {
            Ok(output) => {
                let resources = match step {
                    Step::Apply | Step::Destroy => ResourceCount::parse(&output),
                    Step::Init | Step::Validate => None,
                };
                let elapsed_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
                tracing::info!(%step, elapsed_ms, "step passed");
                let outcome = StepOutcome {
                    step,
                    status: StepStatus::Passed,
                    duration,
                    resources,
                    error: None,
                };
                (outcome, None)
            }
            Err(err) => {
                tracing::warn!(%step, error = %err, "step failed");
                let outcome = StepOutcome {
                    step,
                    status: StepStatus::Failed,
                    duration,
                    resources: None,
                    error: Some(err.to_string()),
                };
                (outcome, Some(err))
            }
        }
    }
}
