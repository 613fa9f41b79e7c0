//! Two-tier job state lookup
//!
//! `squeue` knows about jobs still in the queue; once a job leaves it, only
//! accounting (`sacct`) remembers it. Accounting is optional on many
//! clusters, so its failures degrade to UNKNOWN instead of an error.

use crate::error::Result;
use crate::remote::RemoteExecutor;
use crate::types::JobStatus;

/// Cut an accounting state at the first space and strip `+` markers
///
/// `CANCELLED by 1234` becomes `CANCELLED`, `COMPLETED+` becomes `COMPLETED`.
pub fn normalize_accounting_state(raw: &str) -> String {
    let trimmed = raw.trim();
    let first = trimmed.split(' ').next().unwrap_or(trimmed);
    first.trim_matches('+').to_string()
}

fn squeue_args(job_id: &str) -> Vec<String> {
    ["-h", "-j", job_id, "-o", "%T"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn sacct_args(job_id: &str) -> Vec<String> {
    ["-n", "-X", "-j", job_id, "-o", "State"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Query the current state of a job
///
/// Returns `Err` only when the queue query itself fails (transport error or
/// non-zero `squeue`); the poller treats that as transient.
pub async fn query_job_status(executor: &dyn RemoteExecutor, host: &str, job_id: &str) -> Result<JobStatus> {
    if job_id.trim().is_empty() {
        return Ok(JobStatus::unknown());
    }

    let queue = executor
        .exec(host, "squeue", &squeue_args(job_id))
        .await?
        .check(host, &format!("squeue -h -j {} -o %T", job_id))?;

    if let Some(state) = queue.stdout.lines().map(str::trim).find(|l| !l.is_empty()) {
        return Ok(JobStatus::new(state));
    }

    tracing::debug!(job_id, "Job not in queue, asking accounting");
    let accounting = match executor.exec(host, "sacct", &sacct_args(job_id)).await {
        Ok(out) if out.success() => out,
        Ok(out) => {
            tracing::debug!(job_id, exit_code = ?out.exit_code, "sacct failed, reporting UNKNOWN");
            return Ok(JobStatus::unknown());
        }
        Err(e) => {
            tracing::debug!(job_id, error = %e, "sacct unavailable, reporting UNKNOWN");
            return Ok(JobStatus::unknown());
        }
    };

    let state = accounting
        .stdout
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(normalize_accounting_state)
        .filter(|s| !s.is_empty());

    Ok(state.map_or_else(JobStatus::unknown, JobStatus::new))
}
