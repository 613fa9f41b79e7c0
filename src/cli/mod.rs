//! Command-line interface for the `exp` binary
//!
//! - `exp run [flags] -- [script args...]`: submit, monitor, sync artifacts
//! - `exp list`: every recorded experiment, newest first
//! - `exp show <id>`: one experiment in detail
//! - `exp fetch <id>`: sync artifacts of a recorded experiment again

pub mod output;

use crate::artifacts::RsyncTransfer;
use crate::config::{RunOverrides, db_path, format_duration, resolve_run_params};
use crate::db::Database;
use crate::error::{Error, Result};
use crate::lifecycle::{FetchOverrides, Lifecycle};
use crate::remote::SshExecutor;
use crate::types::ExperimentId;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// exp - track Slurm experiments submitted over ssh
#[derive(Debug, Parser)]
#[command(name = "exp")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Submit a job, monitor it, and fetch its artifacts
    Run(RunArgs),

    /// List recorded experiments
    List,

    /// Show one experiment
    Show {
        /// Experiment id
        id: ExperimentId,
    },

    /// Fetch artifacts of a recorded experiment
    Fetch(FetchArgs),
}

/// Arguments for `exp run`
#[derive(Debug, Default, Args)]
pub struct RunArgs {
    /// Remote host (user@host); falls back to EXP_REMOTE
    #[arg(long)]
    pub remote: Option<String>,

    /// Experiment name
    #[arg(long)]
    pub name: Option<String>,

    /// Remote directory for sbatch logs
    #[arg(long)]
    pub log_dir: Option<String>,

    /// Remote batch script path
    #[arg(long)]
    pub script: Option<String>,

    /// Local script to run on the remote host before submitting
    #[arg(long)]
    pub build_script: Option<String>,

    /// Local batch script uploaded to --script before submitting
    #[arg(long)]
    pub script_local: Option<String>,

    /// Absolute remote directory holding artifacts
    #[arg(long)]
    pub artifact_remote: Option<String>,

    /// Local base directory for artifacts (the experiment id is appended)
    #[arg(long)]
    pub artifact_dest: Option<String>,

    /// Regular expression selecting artifacts (repeatable)
    #[arg(long = "artifact-pattern")]
    pub artifact_patterns: Vec<String>,

    /// Per-run config file (YAML or JSON)
    #[arg(long)]
    pub config_file: Option<PathBuf>,

    /// Profile from ~/.exp/config.yaml
    #[arg(long)]
    pub profile: Option<String>,

    /// Only fetch files modified after submission
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub artifact_since_start: Option<bool>,

    /// Status poll interval (e.g. 30s, 2m)
    #[arg(long)]
    pub poll_interval: Option<String>,

    /// Arguments passed to the batch script
    #[arg(last = true)]
    pub args: Vec<String>,
}

impl From<RunArgs> for RunOverrides {
    fn from(args: RunArgs) -> Self {
        Self {
            remote: args.remote,
            name: args.name,
            log_dir: args.log_dir,
            script: args.script,
            build_script: args.build_script,
            script_local: args.script_local,
            artifact_remote: args.artifact_remote,
            artifact_dest: args.artifact_dest,
            artifact_patterns: args.artifact_patterns,
            artifact_since_start: args.artifact_since_start,
            poll_interval: args.poll_interval,
            config_file: args.config_file,
            profile: args.profile,
            args: args.args,
        }
    }
}

/// Arguments for `exp fetch`
#[derive(Debug, Args)]
pub struct FetchArgs {
    /// Experiment id
    pub id: ExperimentId,

    /// Absolute remote directory to copy instead of the recorded sources
    #[arg(long)]
    pub remote_path: Option<String>,

    /// Local base directory; files land in <dest>/<id> (defaults to the recorded destination)
    #[arg(long)]
    pub dest: Option<String>,

    /// Regular expression replacing the recorded patterns (repeatable)
    #[arg(long = "pattern")]
    pub patterns: Vec<String>,

    /// Only fetch files modified after submission
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub since_start: Option<bool>,

    /// Print matching paths without copying
    #[arg(long)]
    pub dry_run: bool,
}

impl From<&FetchArgs> for FetchOverrides {
    fn from(args: &FetchArgs) -> Self {
        Self {
            remote_path: args.remote_path.clone(),
            dest: args.dest.clone(),
            patterns: args.patterns.clone(),
            since_start: args.since_start,
            dry_run: args.dry_run,
        }
    }
}

/// Process-wide inputs for command handlers
#[derive(Debug, Clone)]
pub struct Context {
    /// `~/.exp`
    pub config_dir: PathBuf,
    /// Value of `EXP_REMOTE`
    pub env_remote: Option<String>,
    /// Cancelled on SIGINT/SIGTERM
    pub cancel: CancellationToken,
}

async fn open_db(config_dir: &Path) -> Result<Database> {
    Database::new(&db_path(config_dir)).await
}

async fn open_lifecycle(ctx: &Context) -> Result<Lifecycle> {
    let executor = SshExecutor::from_path()
        .ok_or_else(|| Error::ExternalTool("ssh not found in PATH".to_string()))?;
    let transfer = RsyncTransfer::from_path()
        .ok_or_else(|| Error::ExternalTool("rsync and scp must be in PATH".to_string()))?;
    let db = open_db(&ctx.config_dir).await?;
    Ok(Lifecycle::new(Arc::new(executor), Arc::new(transfer), Arc::new(db)).with_cancellation(ctx.cancel.clone()))
}

/// Run one parsed command
pub async fn execute(command: Commands, ctx: &Context) -> Result<()> {
    match command {
        Commands::Run(args) => run(args, ctx).await,
        Commands::List => list(ctx).await,
        Commands::Show { id } => show(id, ctx).await,
        Commands::Fetch(args) => fetch(&args, ctx).await,
    }
}

async fn run(args: RunArgs, ctx: &Context) -> Result<()> {
    let params = resolve_run_params(&args.into(), &ctx.config_dir, ctx.env_remote.as_deref())?;
    let lifecycle = open_lifecycle(ctx).await?;

    let mut experiment = lifecycle.submit(&params).await?;
    print!("{}", output::format_submission(&experiment, &params));
    println!(
        "Monitoring job {} every {} ...",
        experiment.job_id,
        format_duration(params.poll_interval)
    );

    let report = lifecycle.monitor(&mut experiment, params.poll_interval).await?;
    println!("Job {} finished: {}", experiment.job_id, experiment.job_status);
    match report {
        Some(report) => println!(
            "Fetched {} file(s) into {}",
            report.matched_count(),
            report.dest.display()
        ),
        None => println!("No artifact paths configured for this experiment; skipping automatic fetch."),
    }
    Ok(())
}

async fn list(ctx: &Context) -> Result<()> {
    let db = open_db(&ctx.config_dir).await?;
    let rows = db.list_experiments().await?;
    print!("{}", output::format_list(&rows));
    db.close().await;
    Ok(())
}

async fn show(id: ExperimentId, ctx: &Context) -> Result<()> {
    let db = open_db(&ctx.config_dir).await?;
    let experiment = db.get_experiment(id).await?.ok_or(Error::NotFound(id.get()))?;
    print!("{}", output::format_show(&experiment));
    db.close().await;
    Ok(())
}

async fn fetch(args: &FetchArgs, ctx: &Context) -> Result<()> {
    let lifecycle = open_lifecycle(ctx).await?;
    let report = lifecycle.fetch(args.id, &args.into()).await?;

    if report.dry_run {
        let paths = report.would_copy();
        if paths.is_empty() {
            println!("No files matched.");
        }
        for path in paths {
            println!("{}", path);
        }
        return Ok(());
    }

    println!("Fetch complete.");
    Ok(())
}
