use std::path::PathBuf;

use clap::{Parser, Subcommand};

use tfcheck::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run init, validate, apply + idempotency check and destroy for each case
    Run(RunArgs),
    /// Print the default retryable error patterns
    Defaults,
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// Configuration directories, one case each
    #[arg(value_name = "DIR")]
    pub dirs: Vec<PathBuf>,

    /// JSON suite file listing cases
    #[arg(long, conflicts_with = "dirs")]
    pub suite: Option<PathBuf>,

    #[arg(long, env = "TFCHECK_BINARY")]
    pub binary: Option<String>,

    /// Keep colored terraform output
    #[arg(long)]
    pub color: bool,

    #[arg(long, env = "TFCHECK_MAX_RETRIES")]
    pub max_retries: Option<u32>,

    #[arg(long, env = "TFCHECK_RETRY_DELAY_SECS")]
    pub retry_delay_secs: Option<u64>,

    /// Do not merge the default retryable error table
    #[arg(long)]
    pub no_default_retries: bool,

    /// Input variable passed to every case, as NAME=VALUE
    #[arg(long = "var", value_name = "NAME=VALUE", value_parser = parse_var)]
    pub vars: Vec<(String, String)>,

    /// Share a provider plugin cache between cases, in the user cache dir
    #[arg(long)]
    pub plugin_cache: bool,

    /// Share a provider plugin cache between cases, in DIR
    #[arg(long, value_name = "DIR", env = "TFCHECK_PLUGIN_CACHE_DIR")]
    pub plugin_cache_dir: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
}

fn parse_var(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected NAME=VALUE, got '{raw}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use serial_test::serial;

    fn run_args(argv: &[&str]) -> RunArgs {
        let cli = Cli::parse_from(argv);
        match cli.command {
            Command::Run(args) => args,
            other => panic!("Expected Run command, got {:?}", other),
        }
    }

    #[test]
    #[serial]
    fn test_run_dirs_and_defaults() {
        let args = run_args(&["tfcheck", "run", "demos/default", "demos/diff-rg"]);

        assert_eq!(
            args.dirs,
            vec![PathBuf::from("demos/default"), PathBuf::from("demos/diff-rg")]
        );
        assert!(!args.color);
        assert!(!args.no_default_retries);
        assert_eq!(args.format, OutputFormat::Table);
    }

    #[test]
    fn test_run_vars() {
        let args = run_args(&[
            "tfcheck",
            "run",
            "demos/diff-rg",
            "--var",
            "location=westeurope",
            "--var=suffix=a=b",
        ]);

        assert_eq!(
            args.vars,
            vec![
                ("location".to_string(), "westeurope".to_string()),
                ("suffix".to_string(), "a=b".to_string())
            ]
        );
    }

    #[test]
    fn test_run_var_without_equals_rejected() {
        let result = Cli::try_parse_from(["tfcheck", "run", "--var", "location"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_suite_conflicts_with_dirs() {
        let result = Cli::try_parse_from(["tfcheck", "run", "demos/default", "--suite", "s.json"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_format_json() {
        let args = run_args(&["tfcheck", "run", "--suite", "s.json", "--format", "json"]);
        assert_eq!(args.format, OutputFormat::Json);
        assert_eq!(args.suite, Some(PathBuf::from("s.json")));
    }

    #[test]
    fn test_defaults_command() {
        let cli = Cli::parse_from(["tfcheck", "defaults"]);
        assert!(matches!(cli.command, Command::Defaults));
    }

    #[test]
    #[serial]
    fn test_binary_from_env_var_fallback() {
        let backup = std::env::var("TFCHECK_BINARY").ok();

        unsafe {
            std::env::set_var("TFCHECK_BINARY", "tofu");
        }

        let args = run_args(&["tfcheck", "run", "demos/default"]);

        unsafe {
            match backup {
                Some(binary) => std::env::set_var("TFCHECK_BINARY", binary),
                None => std::env::remove_var("TFCHECK_BINARY"),
            }
        }

        assert_eq!(args.binary, Some("tofu".to_string()));
    }

    #[test]
    #[serial]
    fn test_binary_flag_takes_precedence_over_env() {
        let backup = std::env::var("TFCHECK_BINARY").ok();

        unsafe {
            std::env::set_var("TFCHECK_BINARY", "tofu");
        }

        let args = run_args(&["tfcheck", "run", "--binary=terraform", "demos/default"]);

        unsafe {
            match backup {
                Some(binary) => std::env::set_var("TFCHECK_BINARY", binary),
                None => std::env::remove_var("TFCHECK_BINARY"),
            }
        }

        assert_eq!(args.binary, Some("terraform".to_string()));
    }

    #[test]
    #[serial]
    fn test_max_retries_from_env() {
        let backup = std::env::var("TFCHECK_MAX_RETRIES").ok();

        unsafe {
            std::env::set_var("TFCHECK_MAX_RETRIES", "7");
        }

        let args = run_args(&["tfcheck", "run", "demos/default"]);

        unsafe {
            match backup {
                Some(value) => std::env::set_var("TFCHECK_MAX_RETRIES", value),
                None => std::env::remove_var("TFCHECK_MAX_RETRIES"),
            }
        }

        assert_eq!(args.max_retries, Some(7));
    }
}
