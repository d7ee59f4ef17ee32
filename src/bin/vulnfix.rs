use clap::Parser;
use std::io::Write;
use std::process::ExitCode;
use tracing::{error, warn};

use vulnfix::app::{self, AppError};
use vulnfix::cli::Cli;
use vulnfix::config::{self, Config};
use vulnfix::output::WriteError;

const LOG_ENV: &str = "VULNFIX_LOG";

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_tracing(cli.quiet, cli.verbose) {
        eprintln!("vulnfix: {e}");
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("vulnfix error: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    match std::env::current_dir() {
        Ok(cwd) => {
            config::load_dotenv(&cwd)?;
        }
        Err(e) => warn!(error = %e, "Cannot resolve working directory; skipping .env"),
    }
    let config = Config::from_env();

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    app::dispatch(cli.command, &config, &mut out).await?;
    out.flush().map_err(|source| {
        AppError::Write(WriteError::Io {
            path: "<stdout>".into(),
            source,
        })
    })
}

/// Logs go to stderr so stdout carries only the JSON result.
fn init_tracing(quiet: bool, verbose: bool) -> Result<(), String> {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "info"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| format!("failed to initialize tracing subscriber: {e}"))
}
