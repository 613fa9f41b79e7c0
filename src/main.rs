//! exp - submit Slurm jobs over ssh, follow them, and fetch their artifacts

use clap::Parser;
use exp_tracker::cli::{Cli, Context, execute};
use exp_tracker::config::{REMOTE_ENV_VAR, config_dir};
use exp_tracker::{Error, cancel_on_signal};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(async_main(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

async fn async_main(cli: Cli) -> Result<(), Error> {
    let cancel = CancellationToken::new();
    cancel_on_signal(cancel.clone());

    let ctx = Context {
        config_dir: config_dir()?,
        env_remote: std::env::var(REMOTE_ENV_VAR).ok(),
        cancel,
    };
    execute(cli.command, &ctx).await
}
