//! Experiment lifecycle: submit, monitor, and pull artifacts
//!
//! [`Lifecycle`] ties the pieces together for a single experiment:
//!
//! 1. optional build script and batch script upload
//! 2. `sbatch` submission and the initial `SUBMITTED` record
//! 3. status polling until the job is terminal
//! 4. after a settle delay, discovery, filtering and transfer for every
//!    artifact source into the experiment's own destination directory
//!
//! Manual fetches reuse step 4 against a recorded experiment.

use crate::artifacts::sources::{normalize_patterns, split_patterns, validate_source_path};
use crate::artifacts::transfer::source_spec;
use crate::artifacts::{FileTransfer, PatternFilter, PullRequest, discover};
use crate::config::RunParams;
use crate::db::{Database, NewExperiment};
use crate::error::{Error, Result};
use crate::git::{candidate_dirs, lookup_git_info};
use crate::monitor::StatusPoller;
use crate::prepare::{run_build_script, upload_script};
use crate::remote::RemoteExecutor;
use crate::retry::{RetryPolicy, sleep_or_cancel};
use crate::slurm::{SubmitRequest, log_template, submit_job};
use crate::types::{ArtifactSource, Experiment, ExperimentId, JobStatus};
use crate::utils::expand_local_path;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Pauses used by the artifact phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleTiming {
    /// Wait between the terminal state and the first listing
    pub settle_delay: Duration,
    /// Attempts and pause per listing strategy
    pub listing: RetryPolicy,
}

impl Default for LifecycleTiming {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(10),
            listing: RetryPolicy::default(),
        }
    }
}

/// Overrides accepted by a manual fetch
#[derive(Debug, Clone, Default)]
pub struct FetchOverrides {
    /// Replace every recorded source with this absolute remote path
    pub remote_path: Option<String>,
    /// Base destination; the experiment id is appended
    pub dest: Option<String>,
    /// Replace the patterns of every source
    pub patterns: Vec<String>,
    /// Override the recorded since-start flag
    pub since_start: Option<bool>,
    /// List what would be copied without copying or recording anything
    pub dry_run: bool,
}

/// Outcome for one artifact source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceReport {
    /// Remote root
    pub root: String,
    /// Files the listing returned
    pub discovered: usize,
    /// Relative paths that passed the filter
    pub matched: Vec<String>,
}

/// Outcome of an artifact sync
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchReport {
    /// Local destination directory
    pub dest: PathBuf,
    /// Per-source results, in transfer order
    pub sources: Vec<SourceReport>,
    /// Whether the transfer step was skipped
    pub dry_run: bool,
}

impl FetchReport {
    /// Absolute remote paths of every matched file
    pub fn would_copy(&self) -> Vec<String> {
        self.sources
            .iter()
            .flat_map(|s| {
                s.matched
                    .iter()
                    .map(|rel| crate::artifacts::sources::join_remote(&s.root, rel))
            })
            .collect()
    }

    /// Number of matched files across all sources
    pub fn matched_count(&self) -> usize {
        self.sources.iter().map(|s| s.matched.len()).sum()
    }
}

struct PreparedSource {
    root: String,
    filter: PatternFilter,
}

/// Validate roots and compile filters before any remote call
fn prepare_sources(sources: &[ArtifactSource]) -> Result<Vec<PreparedSource>> {
    sources
        .iter()
        .map(|s| {
            Ok(PreparedSource {
                root: validate_source_path(&s.path, "artifact source path")?,
                filter: PatternFilter::compile(&s.patterns)?,
            })
        })
        .collect()
}

/// Runs the submit/monitor/fetch sequence for one experiment at a time
pub struct Lifecycle {
    executor: Arc<dyn RemoteExecutor>,
    transfer: Arc<dyn FileTransfer>,
    db: Arc<Database>,
    timing: LifecycleTiming,
    cancel: CancellationToken,
}

impl Lifecycle {
    /// Create a lifecycle with default timing and a fresh cancellation token
    pub fn new(executor: Arc<dyn RemoteExecutor>, transfer: Arc<dyn FileTransfer>, db: Arc<Database>) -> Self {
        Self {
            executor,
            transfer,
            db,
            timing: LifecycleTiming::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Replace the settle delay and listing retry policy
    pub fn with_timing(mut self, timing: LifecycleTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Use `cancel` to stop monitoring and listing retries
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The experiment store
    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Prepare the remote side, submit the job and record the experiment
    ///
    /// The returned experiment has status `SUBMITTED`. When a destination is
    /// configured, `<dest>/<id>` is created and recorded.
    pub async fn submit(&self, params: &RunParams) -> Result<Experiment> {
        let host = params.remote.as_str();

        if let Some(build) = &params.build_script {
            run_build_script(self.executor.as_ref(), host, build).await?;
        }
        if let Some(local) = &params.script_local {
            upload_script(self.transfer.as_ref(), host, local, &params.script).await?;
        }

        let request = SubmitRequest {
            host: host.to_string(),
            log_template: log_template(&params.log_dir, &params.name),
            script_path: params.script.clone(),
            args: params.args.clone(),
        };
        let submission = submit_job(self.executor.as_ref(), &request).await?;

        let dirs = candidate_dirs(&params.script, params.primary_artifact_path());
        let git = lookup_git_info(self.executor.as_ref(), host, &dirs).await;

        let new = NewExperiment {
            name: params.name.clone(),
            remote: params.remote.clone(),
            script_path: params.script.clone(),
            args: params.args.clone(),
            git_commit: git.commit.clone(),
            git_branch: git.branch.clone(),
            job_id: submission.job_id.clone(),
            job_status: JobStatus::submitted(),
            log_path: submission.log_path.clone(),
            artifact_remote: params.primary_artifact_path().map(str::to_string),
            artifact_sources: params.artifact_sources.clone(),
            artifact_pattern: params.artifact_pattern.clone(),
            artifact_since_start: params.artifact_since_start,
        };
        let id = self.db.insert_experiment(&new).await?;

        let dest = match &params.artifact_dest {
            Some(base) => {
                let dest = base.join(id.to_string());
                tokio::fs::create_dir_all(&dest).await?;
                Some(dest)
            }
            None => None,
        };
        let snapshot = params.snapshot(dest.as_deref(), git.commit.as_deref(), git.branch.as_deref());
        let snapshot = serde_json::to_string(&snapshot)?;
        let dest_str = dest.as_ref().map(|d| d.display().to_string());
        self.db
            .set_artifact_dest(id, dest_str.as_deref(), Some(&snapshot))
            .await?;

        info!(
            id = %id,
            job_id = %submission.job_id,
            host,
            log_path = %submission.log_path,
            "Recorded experiment"
        );

        self.db.get_experiment(id).await?.ok_or(Error::NotFound(id.get()))
    }

    /// Poll to completion, then sync artifacts if any are configured
    ///
    /// A sync failure is recorded as the experiment's last error and
    /// returned. A successful sync records its time and clears the error.
    pub async fn monitor(&self, experiment: &mut Experiment, interval: Duration) -> Result<Option<FetchReport>> {
        let poller = StatusPoller::new(self.executor.as_ref(), &self.db, self.cancel.clone());
        poller.poll_until_terminal(experiment, interval).await?;

        if !experiment.has_artifact_config() {
            return Ok(None);
        }
        let Some(dest) = experiment.artifact_dest.clone() else {
            return Ok(None);
        };

        info!(
            id = %experiment.id,
            delay_secs = self.timing.settle_delay.as_secs_f64(),
            "Waiting for remote files to settle"
        );
        sleep_or_cancel(&self.cancel, self.timing.settle_delay).await?;

        let sources = experiment.effective_artifact_sources();
        let since = experiment
            .artifact_since_start
            .then_some(experiment.created_at);
        let prepared = prepare_sources(&sources)?;
        let result = self
            .sync(&experiment.remote, &prepared, Path::new(&dest), since, false)
            .await;
        self.record_outcome(experiment, &result).await?;
        result.map(Some)
    }

    /// Submit and monitor in one call
    pub async fn run(&self, params: &RunParams) -> Result<(Experiment, Option<FetchReport>)> {
        let mut experiment = self.submit(params).await?;
        let report = self.monitor(&mut experiment, params.poll_interval).await?;
        Ok((experiment, report))
    }

    /// Sync a recorded experiment's artifacts on demand
    pub async fn fetch(&self, id: ExperimentId, overrides: &FetchOverrides) -> Result<FetchReport> {
        let mut experiment = self
            .db
            .get_experiment(id)
            .await?
            .ok_or(Error::NotFound(id.get()))?;

        let remote_path = overrides
            .remote_path
            .as_deref()
            .map(|p| validate_source_path(p, "remote-path"))
            .transpose()?;

        let dest = match overrides.dest.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
            Some(base) => expand_local_path(base).join(id.to_string()),
            None => match experiment.artifact_dest.as_deref().filter(|d| !d.is_empty()) {
                Some(recorded) => PathBuf::from(recorded),
                None => {
                    return Err(Error::config(
                        "dest is required and no artifact destination is recorded",
                        "dest",
                    ));
                }
            },
        };

        let mut sources = match remote_path {
            Some(path) => vec![ArtifactSource::new(path, split_patterns(&experiment.artifact_pattern))],
            None => experiment.effective_artifact_sources(),
        };
        if sources.is_empty() {
            return Err(Error::config(
                format!("no artifact sources recorded for experiment {}; use --remote-path", id),
                "remote-path",
            ));
        }

        let patterns = normalize_patterns(&overrides.patterns);
        if !patterns.is_empty() {
            for source in &mut sources {
                source.patterns = patterns.clone();
            }
        }

        let since_start = overrides
            .since_start
            .unwrap_or(experiment.artifact_since_start);
        let since = since_start.then_some(experiment.created_at);

        let prepared = prepare_sources(&sources)?;
        let result = self
            .sync(&experiment.remote, &prepared, &dest, since, overrides.dry_run)
            .await;
        if !overrides.dry_run {
            self.record_outcome(&mut experiment, &result).await?;
        }
        result
    }

    async fn sync(
        &self,
        host: &str,
        sources: &[PreparedSource],
        dest: &Path,
        since: Option<DateTime<Utc>>,
        dry_run: bool,
    ) -> Result<FetchReport> {
        let mut report = FetchReport {
            dest: dest.to_path_buf(),
            sources: Vec::with_capacity(sources.len()),
            dry_run,
        };

        for source in sources {
            let discovery = discover(
                self.executor.as_ref(),
                host,
                &source.root,
                since,
                self.timing.listing,
                &self.cancel,
            )
            .await?;
            let matched = source.filter.filter(&source.root, &discovery.files);
            info!(
                host,
                root = %source.root,
                discovered = discovery.files.len(),
                matched = matched.len(),
                "Filtered remote artifacts"
            );

            if !dry_run && !matched.is_empty() {
                info!(
                    source = %source_spec(host, &source.root),
                    dest = %dest.display(),
                    files = matched.len(),
                    "Transferring artifacts"
                );
                let request = PullRequest {
                    host: host.to_string(),
                    root: source.root.clone(),
                    files: matched.clone(),
                    dest: dest.to_path_buf(),
                };
                self.transfer.pull(&request).await?;
            }

            report.sources.push(SourceReport {
                root: source.root.clone(),
                discovered: discovery.files.len(),
                matched,
            });
        }

        Ok(report)
    }

    async fn record_outcome(&self, experiment: &mut Experiment, result: &Result<FetchReport>) -> Result<()> {
        match result {
            Ok(report) => {
                let now = Utc::now();
                self.db
                    .record_artifact_sync(experiment.id, Some(now), None)
                    .await?;
                experiment.artifact_last_sync = Some(now);
                experiment.artifact_last_error = None;
                info!(
                    id = %experiment.id,
                    files = report.matched_count(),
                    dest = %report.dest.display(),
                    "Artifact sync complete"
                );
            }
            Err(Error::Cancelled) => {}
            Err(e) => {
                let message = e.to_string();
                warn!(id = %experiment.id, error = %message, "Artifact sync failed");
                self.db
                    .record_artifact_sync(experiment.id, None, Some(&message))
                    .await?;
                experiment.artifact_last_error = Some(message);
            }
        }
        Ok(())
    }
}
