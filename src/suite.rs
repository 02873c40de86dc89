//! A set of independent cases run concurrently.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;

use crate::error::TfcheckError;
use crate::lifecycle::{LifecycleReport, LifecycleRunner};
use crate::terraform::{Options, with_default_retryable_errors};

/// One named configuration directory and the options it runs with.
///
/// When the suite merges the default retryable errors, the case's own
/// `max_retries` and `time_between_retries` are replaced by the default
/// budget; use the suite-level `max_retries` / `retry_delay_secs` to change
/// it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CaseSpec {
    pub name: String,
    #[serde(flatten)]
    pub options: Options,
}

impl CaseSpec {
    /// Case named after the last component of `dir`.
    pub fn from_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| dir.display().to_string());
        Self {
            name,
            options: Options::new(dir),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Suite {
    pub cases: Vec<CaseSpec>,
    /// NOTE: merges the default transient-error table into every case
    #[serde(default = "default_true")]
    pub default_retryable_errors: bool,
    /// Overrides every case's retry budget, applied after the defaults.
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub retry_delay_secs: Option<u64>,
}

fn default_true() -> bool {
    true
}

impl Suite {
    pub fn new(cases: Vec<CaseSpec>) -> Self {
        Self {
            cases,
            default_retryable_errors: true,
            max_retries: None,
            retry_delay_secs: None,
        }
    }

    /// Loads a JSON suite; relative case directories resolve against the
    /// file's own directory.
    pub fn load(path: &Path) -> Result<Self, TfcheckError> {
        let raw = std::fs::read_to_string(path)?;
        let mut suite: Suite =
            serde_json::from_str(&raw).map_err(|e| TfcheckError::SuiteFile {
                path: path.to_path_buf(),
                source: e,
            })?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        for case in &mut suite.cases {
            if case.options.terraform_dir.is_relative() {
                case.options.terraform_dir = base.join(&case.options.terraform_dir);
            }
        }

        Ok(suite)
    }

    /// Applies `f` to every case's options.
    pub fn configure(&mut self, f: impl Fn(&mut Options)) {
        for case in &mut self.cases {
            f(&mut case.options);
        }
    }

    /// Options a case actually runs with: defaults merged, overrides applied.
    ///
    /// With `default_retryable_errors` set, the merge resets the retry budget
    /// to [`DEFAULT_MAX_RETRIES`](crate::terraform::DEFAULT_MAX_RETRIES) and
    /// the default delay, whatever the case declared. The suite-level
    /// `max_retries` and `retry_delay_secs` are applied last and always win.
    pub fn effective_options(&self, options: &Options) -> Options {
        let mut effective = if self.default_retryable_errors {
            with_default_retryable_errors(options)
        } else {
            options.clone()
        };
        if let Some(max_retries) = self.max_retries {
            effective.max_retries = max_retries;
        }
        if let Some(secs) = self.retry_delay_secs {
            effective.time_between_retries = Duration::from_secs(secs);
        }
        effective
    }

    /// Every case must point at its own existing directory so concurrent
    /// runs never share state.
    pub fn check_disjoint(&self) -> Result<(), TfcheckError> {
        if self.cases.is_empty() {
            return Err(TfcheckError::Config("suite has no cases".to_string()));
        }

        let mut seen: BTreeMap<PathBuf, &str> = BTreeMap::new();
        for case in &self.cases {
            let dir = case.options.terraform_dir.canonicalize().map_err(|_| {
                TfcheckError::MissingDirectory {
                    case: case.name.clone(),
                    dir: case.options.terraform_dir.clone(),
                }
            })?;

            if let Some(first) = seen.insert(dir.clone(), case.name.as_str()) {
                return Err(TfcheckError::SharedDirectory {
                    first: first.to_string(),
                    second: case.name.clone(),
                    dir,
                });
            }
        }
        Ok(())
    }

    /// Runs all cases concurrently and returns their reports in declaration
    /// order. Case failures are reported, not returned as `Err`.
    pub async fn run(&self, runner: &LifecycleRunner) -> Result<SuiteReport, TfcheckError> {
        self.check_disjoint()?;

        let mut tasks = JoinSet::new();
        for (index, case) in self.cases.iter().enumerate() {
            let runner = runner.clone();
            let name = case.name.clone();
            let options = self.effective_options(&case.options);

            tasks.spawn(async move { (index, runner.run(&name, &options).await) });
        }

        tracing::info!(cases = self.cases.len(), "suite started");

        // Drain every task so a panicking case cannot cancel a sibling's
        // teardown.
        let mut reports = Vec::with_capacity(self.cases.len());
        let mut first_err = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(err) => {
                    tracing::error!(error = %err, "case task failed");
                    first_err.get_or_insert(err);
                }
            }
        }
        if let Some(err) = first_err {
            return Err(err.into());
        }
        reports.sort_by_key(|(index, _)| *index);

        let report = SuiteReport {
            cases: reports.into_iter().map(|(_, report)| report).collect(),
        };
        tracing::info!(
            passed = report.passed_count(),
            failed = report.cases.len() - report.passed_count(),
            "suite finished"
        );
        Ok(report)
    }
}

#[derive(Debug, Serialize)]
pub struct SuiteReport {
    pub cases: Vec<LifecycleReport>,
}

impl SuiteReport {
    pub fn passed(&self) -> bool {
        self.cases.iter().all(LifecycleReport::passed)
    }

    pub fn passed_count(&self) -> usize {
        self.cases.iter().filter(|case| case.passed()).count()
    }
}
