use thiserror::Error;

/// Failure of a single CLI invocation, after retries.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The executable could not be started (missing binary, bad working dir)
    #[error("failed to run {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    /// Non-zero exit whose output matched no retryable pattern
    #[error("{command} exited with code {exit_code}:\n{output}")]
    Failed {
        command: String,
        exit_code: i32,
        output: String,
    },

    /// Every attempt failed with a known transient error
    #[error("{command} still failing after {attempts} attempts ({reason}):\n{output}")]
    RetriesExhausted {
        command: String,
        attempts: u32,
        reason: String,
        output: String,
    },

    #[error("invalid retryable error pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug, Error)]
pub enum TerraformError {
    #[error(transparent)]
    Command(#[from] CommandError),

    /// The plan following an apply still proposed changes
    #[error("terraform configuration not idempotent:\n{output}")]
    NotIdempotent { output: String },

    #[error("{command} returned unexpected exit code {exit_code}")]
    UnexpectedExitCode { command: String, exit_code: i32 },

    #[error("failed to parse terraform output: {0}")]
    OutputParse(#[from] serde_json::Error),
}
