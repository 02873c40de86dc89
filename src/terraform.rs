//! Thin wrapper over the `terraform` / `tofu` CLI.
//!
//! Every command runs in `Options::terraform_dir`, goes through the retry loop
//! and returns the combined stdout/stderr on success.

pub mod args;
mod error;
pub mod options;
mod retry;
mod runner;
mod summary;

pub use error::{CommandError, TerraformError};
pub use options::{
    DEFAULT_MAX_RETRIES, DEFAULT_RETRYABLE_ERRORS, DEFAULT_TIME_BETWEEN_RETRIES, Options,
    default_plugin_cache_dir, with_default_retryable_errors,
};
pub use retry::{RetryPolicy, run_with_retries};
pub use runner::{CommandOutput, CommandRunner, Invocation, ProcessRunner};
pub use summary::ResourceCount;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;

/// `plan -detailed-exitcode`: succeeded, empty diff.
pub const PLAN_NO_CHANGES: i32 = 0;
/// `plan -detailed-exitcode`: succeeded, non-empty diff.
pub const PLAN_HAS_CHANGES: i32 = 2;

/// A single value from `terraform output -json`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OutputValue {
    #[serde(default)]
    pub sensitive: bool,
    #[serde(rename = "type", default)]
    pub value_type: serde_json::Value,
    pub value: serde_json::Value,
}

#[derive(Clone)]
pub struct Terraform {
    runner: Arc<dyn CommandRunner>,
}

impl Default for Terraform {
    fn default() -> Self {
        Self::new(Arc::new(ProcessRunner))
    }
}

impl std::fmt::Debug for Terraform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Terraform").finish_non_exhaustive()
    }
}

impl Terraform {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    pub async fn init(&self, options: &Options) -> Result<String, TerraformError> {
        let output = self
            .run(options, args::init_args(options), |code| code == 0)
            .await?;
        Ok(output.combined())
    }

    pub async fn validate(&self, options: &Options) -> Result<String, TerraformError> {
        let output = self
            .run(options, args::validate_args(options), |code| code == 0)
            .await?;
        Ok(output.combined())
    }

    pub async fn apply(&self, options: &Options) -> Result<String, TerraformError> {
        let output = self
            .run(options, args::apply_args(options), |code| code == 0)
            .await?;
        Ok(output.combined())
    }

    pub async fn init_and_apply(&self, options: &Options) -> Result<String, TerraformError> {
        self.init(options).await?;
        self.apply(options).await
    }

    /// Runs `plan -detailed-exitcode` and returns `PLAN_NO_CHANGES` or
    /// `PLAN_HAS_CHANGES`; exit code 1 is an error.
    pub async fn plan_exit_code(&self, options: &Options) -> Result<i32, TerraformError> {
        Ok(self.plan_detailed(options).await?.exit_code)
    }

    /// Applies, then plans again and fails if the plan is non-empty.
    ///
    /// Returns the apply output.
    pub async fn apply_and_idempotent(&self, options: &Options) -> Result<String, TerraformError> {
        let applied = self.apply(options).await?;

        let plan = self.plan_detailed(options).await?;
        match plan.exit_code {
            PLAN_NO_CHANGES => Ok(applied),
            PLAN_HAS_CHANGES => Err(TerraformError::NotIdempotent {
                output: plan.combined(),
            }),
            other => Err(TerraformError::UnexpectedExitCode {
                command: "plan".to_string(),
                exit_code: other,
            }),
        }
    }

    pub async fn destroy(&self, options: &Options) -> Result<String, TerraformError> {
        let output = self
            .run(options, args::destroy_args(options), |code| code == 0)
            .await?;
        Ok(output.combined())
    }

    /// All root module outputs, keyed by name.
    pub async fn output_all(
        &self,
        options: &Options,
    ) -> Result<BTreeMap<String, OutputValue>, TerraformError> {
        let output = self
            .run(options, args::output_args(options), |code| code == 0)
            .await?;
        Ok(serde_json::from_str(&output.stdout)?)
    }

    async fn plan_detailed(&self, options: &Options) -> Result<CommandOutput, TerraformError> {
        self.run(options, args::plan_exit_code_args(options), |code| {
            code == PLAN_NO_CHANGES || code == PLAN_HAS_CHANGES
        })
        .await
    }

    async fn run<F>(
        &self,
        options: &Options,
        args: Vec<String>,
        accept: F,
    ) -> Result<CommandOutput, TerraformError>
    where
        F: Fn(i32) -> bool,
    {
        let policy = RetryPolicy::from_options(options)?;
        let invocation = Invocation {
            binary: options.binary(),
            args,
            dir: options.terraform_dir.clone(),
            env: options.command_env(),
        };

        let output = run_with_retries(self.runner.as_ref(), &invocation, &policy, accept).await?;

        tracing::debug!(
            command = %invocation.display_name(),
            dir = %invocation.dir().display(),
            exit_code = output.exit_code,
            "command finished"
        );

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    /// Answers by subcommand and records every invocation.
    #[derive(Default)]
    struct ByCommand {
        responses: Mutex<BTreeMap<String, Vec<CommandOutput>>>,
        seen: Mutex<Vec<Invocation>>,
    }

    impl ByCommand {
        fn respond(self, subcommand: &str, output: CommandOutput) -> Self {
            self.responses
                .lock()
                .unwrap()
                .entry(subcommand.to_string())
                .or_default()
                .push(output);
            self
        }

        fn subcommands(&self) -> Vec<String> {
            self.seen
                .lock()
                .unwrap()
                .iter()
                .filter_map(|inv| inv.subcommand().map(str::to_string))
                .collect()
        }
    }

    #[async_trait]
    impl CommandRunner for ByCommand {
        async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, CommandError> {
            self.seen.lock().unwrap().push(invocation.clone());
            let sub = invocation.subcommand().unwrap_or_default().to_string();
            let mut responses = self.responses.lock().unwrap();
            let queue = responses.entry(sub).or_default();
            Ok(if queue.len() > 1 {
                queue.remove(0)
            } else {
                queue.first().cloned().unwrap_or_else(|| CommandOutput::success(""))
            })
        }
    }

    fn options() -> Options {
        Options::new("demos/default")
            .with_no_color(true)
            .with_binary("terraform")
    }

    #[tokio::test]
    async fn test_apply_and_idempotent_clean_plan() {
        let runner = Arc::new(
            ByCommand::default()
                .respond(
                    "apply",
                    CommandOutput::success("Apply complete! Resources: 2 added, 0 changed, 0 destroyed."),
                )
                .respond("plan", CommandOutput::success("No changes.")),
        );
        let tf = Terraform::new(runner.clone());

        let output = tf.apply_and_idempotent(&options()).await.unwrap();

        assert_eq!(ResourceCount::parse(&output).unwrap().add, 2);
        assert_eq!(runner.subcommands(), vec!["apply", "plan"]);
    }

    #[tokio::test]
    async fn test_apply_and_idempotent_detects_drift() {
        let runner = Arc::new(
            ByCommand::default()
                .respond("apply", CommandOutput::success("Apply complete!"))
                .respond(
                    "plan",
                    CommandOutput {
                        exit_code: PLAN_HAS_CHANGES,
                        stdout: "Plan: 0 to add, 1 to change, 0 to destroy.".to_string(),
                        stderr: String::new(),
                    },
                ),
        );
        let tf = Terraform::new(runner);

        let err = tf.apply_and_idempotent(&options()).await.unwrap_err();
        match err {
            TerraformError::NotIdempotent { output } => {
                assert!(output.contains("1 to change"));
            }
            other => panic!("expected NotIdempotent, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_plan_error_is_not_accepted() {
        let runner = Arc::new(
            ByCommand::default().respond("plan", CommandOutput::failure(1, "Error: Invalid provider")),
        );
        let tf = Terraform::new(runner);

        let err = tf.plan_exit_code(&options()).await.unwrap_err();
        assert!(matches!(
            err,
            TerraformError::Command(CommandError::Failed { exit_code: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_invocation_uses_dir_binary_and_args() {
        let runner = Arc::new(ByCommand::default());
        let tf = Terraform::new(runner.clone());
        let mut opts = options().with_binary("tofu");
        opts.plugin_cache_dir = Some("/cache".into());

        tf.validate(&opts).await.unwrap();

        let seen = runner.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].binary, "tofu");
        assert_eq!(seen[0].dir, std::path::PathBuf::from("demos/default"));
        assert_eq!(seen[0].args, vec!["validate", "-no-color"]);
        assert_eq!(seen[0].env["TF_PLUGIN_CACHE_DIR"], "/cache");
    }

    #[tokio::test]
    async fn test_init_and_apply_stops_on_init_failure() {
        let runner = Arc::new(
            ByCommand::default().respond("init", CommandOutput::failure(1, "Error: Failed to load backend")),
        );
        let tf = Terraform::new(runner.clone());

        assert!(tf.init_and_apply(&options()).await.is_err());
        assert_eq!(runner.subcommands(), vec!["init"]);
    }

    #[tokio::test]
    async fn test_output_all_parses_json() {
        let json = r#"{
            "name": {"sensitive": false, "type": "string", "value": "rg-tfcheck"},
            "ids": {"sensitive": false, "type": ["list", "string"], "value": ["a", "b"]}
        }"#;
        let runner = Arc::new(ByCommand::default().respond("output", CommandOutput::success(json)));
        let tf = Terraform::new(runner);

        let outputs = tf.output_all(&options()).await.unwrap();
        assert_eq!(outputs["name"].value, "rg-tfcheck");
        assert_eq!(outputs["ids"].value, serde_json::json!(["a", "b"]));
        assert!(!outputs["name"].sensitive);
    }

    #[tokio::test]
    async fn test_output_all_bad_json() {
        let runner = Arc::new(ByCommand::default().respond("output", CommandOutput::success("not json")));
        let tf = Terraform::new(runner);

        let err = tf.output_all(&options()).await.unwrap_err();
        assert!(matches!(err, TerraformError::OutputParse(_)));
    }
}
