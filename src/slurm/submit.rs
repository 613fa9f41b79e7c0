//! One-shot `sbatch` submission

use crate::error::{RemoteError, Result};
use crate::remote::RemoteExecutor;

/// Everything needed to submit one batch script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitRequest {
    /// Remote host (user@host)
    pub host: String,
    /// Log path with `%j` where Slurm puts the job id
    pub log_template: String,
    /// Batch script path on the remote host
    pub script_path: String,
    /// Arguments passed to the script
    pub args: Vec<String>,
}

impl SubmitRequest {
    /// Arguments given to `sbatch`
    pub fn sbatch_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.args.len() + 2);
        args.push(format!("--output={}", self.log_template));
        args.push(self.script_path.clone());
        args.extend(self.args.iter().cloned());
        args
    }
}

/// An accepted submission
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    /// Scheduler job id
    pub job_id: String,
    /// Log path with the job id substituted
    pub log_path: String,
    /// Combined sbatch output, kept for display
    pub output: String,
}

/// `<log_dir>/<name>-%j.out`
pub fn log_template(log_dir: &str, name: &str) -> String {
    let dir = log_dir.trim_end_matches('/');
    format!("{}/{}-%j.out", dir, name)
}

/// Substitute the job id into a log template
pub fn resolve_log_path(template: &str, job_id: &str) -> String {
    template.replace("%j", job_id)
}

/// Last whitespace-separated token of the sbatch output
///
/// Typical output is `Submitted batch job 2723147`; warnings printed before
/// it do not matter since only the final token is taken.
pub fn parse_job_id(output: &str) -> Option<String> {
    output.split_whitespace().last().map(str::to_string)
}

/// Submit a batch script once
///
/// A non-zero exit or output without any token is fatal. There is no retry:
/// a second `sbatch` could queue the job twice.
pub async fn submit_job(executor: &dyn RemoteExecutor, request: &SubmitRequest) -> Result<Submission> {
    tracing::info!(
        host = %request.host,
        script = %request.script_path,
        log = %request.log_template,
        "Submitting batch job"
    );

    let output = executor
        .exec(&request.host, "sbatch", &request.sbatch_args())
        .await?;
    let combined = output.combined();

    if !output.success() {
        return Err(RemoteError::SubmissionFailed {
            host: request.host.clone(),
            exit_code: output.exit_code,
            output: combined.trim().to_string(),
        }
        .into());
    }

    let job_id = parse_job_id(&combined).ok_or_else(|| RemoteError::UnparseableSubmission {
        host: request.host.clone(),
        output: combined.clone(),
    })?;

    tracing::info!(job_id = %job_id, host = %request.host, "Batch job submitted");
    Ok(Submission {
        log_path: resolve_log_path(&request.log_template, &job_id),
        job_id,
        output: combined,
    })
}
