//! # exp-tracker
//!
//! Track batch jobs submitted to a remote Slurm cluster over ssh.
//!
//! ## Overview
//!
//! exp-tracker submits a batch script with `sbatch`, records the submission
//! in a local SQLite store, polls `squeue`/`sacct` until the job finishes,
//! and then pulls result files back with `rsync`. Artifacts can come from
//! several remote directory trees, each filtered by regular expressions and
//! optionally restricted to files written after the job was submitted.
//!
//! Remote commands and bulk copies sit behind the [`RemoteExecutor`] and
//! [`FileTransfer`] traits, so the whole lifecycle can run against stubs.
//!
//! ## Quick Start
//!
//! ```no_run
//! use exp_tracker::config::{RunOverrides, config_dir, db_path, resolve_run_params};
//! use exp_tracker::{Database, Lifecycle, RsyncTransfer, SshExecutor};
//! use std::sync::Arc;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let dir = config_dir()?;
//!     let overrides = RunOverrides {
//!         remote: Some("alice@cluster".to_string()),
//!         name: Some("baseline".to_string()),
//!         log_dir: Some("/home/alice/logs".to_string()),
//!         script: Some("/home/alice/proj/train.sh".to_string()),
//!         ..Default::default()
//!     };
//!     let params = resolve_run_params(&overrides, &dir, None)?;
//!
//!     let lifecycle = Lifecycle::new(
//!         Arc::new(SshExecutor::from_path().ok_or("ssh not found")?),
//!         Arc::new(RsyncTransfer::from_path().ok_or("rsync not found")?),
//!         Arc::new(Database::new(&db_path(&dir)).await?),
//!     );
//!     let (experiment, _report) = lifecycle.run(&params).await?;
//!     println!("job {} ended as {}", experiment.job_id, experiment.job_status);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Artifact discovery, filtering and transfer
pub mod artifacts;
/// Command-line interface
pub mod cli;
/// Configuration types and layered resolution
pub mod config;
/// Database persistence layer
pub mod db;
/// Error types
pub mod error;
/// Source-control metadata lookup
pub mod git;
/// Submit/monitor/fetch orchestration
pub mod lifecycle;
/// Job status polling
pub mod monitor;
/// Build script execution and script upload
pub mod prepare;
/// Remote command execution over ssh
pub mod remote;
/// Fixed-delay retry and cancellable sleeps
pub mod retry;
/// Slurm submission and status queries
pub mod slurm;
/// Core types
pub mod types;
/// Utility functions
pub mod utils;

#[cfg(test)]
mod test_helpers;

// Re-export commonly used types
pub use artifacts::{FileTransfer, PatternFilter, PullRequest, RsyncTransfer};
pub use config::{RunOverrides, RunParams, resolve_run_params};
pub use db::{Database, NewExperiment};
pub use error::{DatabaseError, Error, RemoteError, Result};
pub use lifecycle::{FetchOverrides, FetchReport, Lifecycle, LifecycleTiming, SourceReport};
pub use remote::{CommandOutput, RemoteExecutor, SshExecutor};
pub use retry::RetryPolicy;
pub use types::{ArtifactSource, Experiment, ExperimentId, ExperimentSummary, JobStatus};

/// Cancel `token` when the process receives a termination signal.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// The listener runs as a background task on the current runtime.
///
/// # Example
///
/// ```no_run
/// use exp_tracker::cancel_on_signal;
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() {
///     let cancel = CancellationToken::new();
///     cancel_on_signal(cancel.clone());
///     cancel.cancelled().await;
/// }
/// ```
pub fn cancel_on_signal(token: tokio_util::sync::CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            _ = wait_for_signal() => token.cancel(),
            _ = token.cancelled() => {}
        }
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // registration can fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, stopping");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT (Ctrl+C), stopping");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT (Ctrl+C), stopping");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM, stopping");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C, stopping");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
