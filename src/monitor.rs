//! Status polling until a job leaves the scheduler
//!
//! The poller queries the scheduler on a fixed interval and persists every
//! observed state. A failed query is logged and retried on the next tick
//! without touching the stored status. The first terminal state also records
//! the completion time and ends the loop.
//!
//! # Example
//!
//! ```no_run
//! use exp_tracker::monitor::StatusPoller;
//! use exp_tracker::remote::SshExecutor;
//! use exp_tracker::{Database, ExperimentId};
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(db: Database) -> exp_tracker::Result<()> {
//! let executor = SshExecutor::from_path().ok_or(exp_tracker::Error::ExternalTool("ssh".into()))?;
//! let mut experiment = db.get_experiment(ExperimentId(1)).await?.ok_or(exp_tracker::Error::NotFound(1))?;
//!
//! let poller = StatusPoller::new(&executor, &db, CancellationToken::new());
//! poller.poll_until_terminal(&mut experiment, Duration::from_secs(30)).await?;
//! println!("{} finished as {}", experiment.job_id, experiment.job_status);
//! # Ok(())
//! # }
//! ```

use crate::db::Database;
use crate::error::Result;
use crate::remote::RemoteExecutor;
use crate::retry::sleep_or_cancel;
use crate::slurm::query_job_status;
use crate::types::Experiment;
use chrono::Utc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Drives one experiment from its current status to a terminal one
pub struct StatusPoller<'a> {
    executor: &'a dyn RemoteExecutor,
    db: &'a Database,
    cancel: CancellationToken,
}

impl<'a> StatusPoller<'a> {
    /// Create a poller; cancelling `cancel` stops it at the next pause
    pub fn new(executor: &'a dyn RemoteExecutor, db: &'a Database, cancel: CancellationToken) -> Self {
        Self {
            executor,
            db,
            cancel,
        }
    }

    /// Poll until the scheduler reports a terminal state
    ///
    /// `experiment` is kept in step with the store: its status and completion
    /// time reflect what was last persisted. Query failures retry forever;
    /// only store errors and cancellation end the loop early. Returns the
    /// number of polls made.
    pub async fn poll_until_terminal(&self, experiment: &mut Experiment, interval: Duration) -> Result<u32> {
        let mut polls = 0u32;
        info!(
            id = %experiment.id,
            job_id = %experiment.job_id,
            host = %experiment.remote,
            interval_secs = interval.as_secs_f64(),
            "Monitoring job"
        );

        loop {
            polls += 1;
            let status = match query_job_status(self.executor, &experiment.remote, &experiment.job_id).await {
                Ok(status) => status,
                Err(e) => {
                    warn!(
                        id = %experiment.id,
                        job_id = %experiment.job_id,
                        error = %e,
                        "Status query failed, retrying"
                    );
                    sleep_or_cancel(&self.cancel, interval).await?;
                    continue;
                }
            };

            if status != experiment.job_status {
                info!(
                    id = %experiment.id,
                    job_id = %experiment.job_id,
                    from = %experiment.job_status,
                    to = %status,
                    "Job status changed"
                );
            } else {
                debug!(id = %experiment.id, status = %status, "Job status unchanged");
            }

            if status.is_terminal() {
                let completed_at = experiment.completed_at.unwrap_or_else(Utc::now);
                self.db
                    .update_status(experiment.id, &status, Some(completed_at))
                    .await?;
                experiment.job_status = status;
                experiment.completed_at = Some(completed_at);
                info!(
                    id = %experiment.id,
                    job_id = %experiment.job_id,
                    status = %experiment.job_status,
                    polls,
                    "Job reached terminal state"
                );
                return Ok(polls);
            }

            self.db.update_status(experiment.id, &status, None).await?;
            experiment.job_status = status;
            sleep_or_cancel(&self.cancel, interval).await?;
        }
    }
}
