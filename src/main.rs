mod cli;

use clap::Parser;
use color_eyre::eyre::{Result, bail, eyre};
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command, RunArgs};
use tfcheck::terraform::{DEFAULT_RETRYABLE_ERRORS, default_plugin_cache_dir};
use tfcheck::{CaseSpec, LifecycleRunner, Suite, output};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run(args) => {
            let suite = build_suite(&args)?;
            let report = suite.run(&LifecycleRunner::default()).await?;

            println!("{}", output::render(&report, args.format)?);

            if !report.passed() {
                bail!(
                    "{} of {} cases failed",
                    report.cases.len() - report.passed_count(),
                    report.cases.len()
                );
            }
        }
        Command::Defaults => {
            println!("{}", output::render_retryable_errors(DEFAULT_RETRYABLE_ERRORS));
        }
    }

    Ok(())
}

fn build_suite(args: &RunArgs) -> Result<Suite> {
    let mut suite = match &args.suite {
        Some(path) => Suite::load(path)?,
        None if args.dirs.is_empty() => bail!("no cases given: pass DIR arguments or --suite"),
        None => Suite::new(
            args.dirs
                .iter()
                .map(|dir| {
                    let mut case = CaseSpec::from_dir(dir.clone());
                    case.options.no_color = true;
                    case
                })
                .collect(),
        ),
    };

    if args.no_default_retries {
        suite.default_retryable_errors = false;
    }
    if args.max_retries.is_some() {
        suite.max_retries = args.max_retries;
    }
    if args.retry_delay_secs.is_some() {
        suite.retry_delay_secs = args.retry_delay_secs;
    }

    let plugin_cache_dir = match (&args.plugin_cache_dir, args.plugin_cache) {
        (Some(dir), _) => Some(dir.clone()),
        (None, true) => Some(
            default_plugin_cache_dir().ok_or_else(|| eyre!("no user cache directory available"))?,
        ),
        (None, false) => None,
    };
    if let Some(dir) = &plugin_cache_dir {
        std::fs::create_dir_all(dir)?;
        tracing::info!(dir = %dir.display(), "using shared plugin cache");
    }

    suite.configure(|options| {
        if args.color {
            options.no_color = false;
        }
        if let Some(binary) = &args.binary {
            options.binary = Some(binary.clone());
        }
        for (name, value) in &args.vars {
            options
                .vars
                .insert(name.clone(), serde_json::Value::String(value.clone()));
        }
        if plugin_cache_dir.is_some() {
            options.plugin_cache_dir = plugin_cache_dir.clone();
        }
    });

    Ok(suite)
}
