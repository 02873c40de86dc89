use std::time::Duration;

use regex::Regex;

use super::error::CommandError;
use super::options::Options;
use super::runner::{CommandOutput, CommandRunner, Invocation};

/// Compiled form of the options' retry settings.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    patterns: Vec<(Regex, String)>,
    max_retries: u32,
    delay: Duration,
}

impl RetryPolicy {
    pub fn from_options(options: &Options) -> Result<Self, CommandError> {
        let patterns = options
            .retryable_errors
            .iter()
            .map(|(pattern, reason)| {
                Regex::new(pattern)
                    .map(|re| (re, reason.clone()))
                    .map_err(|e| CommandError::InvalidPattern {
                        pattern: pattern.clone(),
                        source: e,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            patterns,
            max_retries: options.max_retries,
            delay: options.time_between_retries,
        })
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Reason attached to the first pattern matching `output`.
    pub fn retryable_reason(&self, output: &str) -> Option<&str> {
        self.patterns
            .iter()
            .find(|(re, _)| re.is_match(output))
            .map(|(_, reason)| reason.as_str())
    }
}

/// Runs `invocation` until it exits with an accepted code, retrying only on
/// output that matches a retryable pattern.
pub async fn run_with_retries<F>(
    runner: &dyn CommandRunner,
    invocation: &Invocation,
    policy: &RetryPolicy,
    accept: F,
) -> Result<CommandOutput, CommandError>
where
    F: Fn(i32) -> bool,
{
    let command = invocation.display_name();
    let mut attempt = 1u32;

    loop {
        let output = runner.run(invocation).await?;
        if accept(output.exit_code) {
            return Ok(output);
        }

        let combined = output.combined();
        let Some(reason) = policy.retryable_reason(&combined) else {
            return Err(CommandError::Failed {
                command,
                exit_code: output.exit_code,
                output: combined,
            });
        };

        if attempt >= policy.max_attempts() {
            return Err(CommandError::RetriesExhausted {
                command,
                attempts: attempt,
                reason: reason.to_string(),
                output: combined,
            });
        }

        tracing::warn!(
            command = %command,
            attempt,
            exit_code = output.exit_code,
            reason,
            delay_secs = policy.delay.as_secs(),
            "retryable error, retrying"
        );
        tokio::time::sleep(policy.delay).await;
        attempt += 1;
    }
}
