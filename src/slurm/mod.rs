//! Slurm job submission and status queries over the remote executor
//!
//! - [`submit`]: one-shot `sbatch` submission and job id parsing
//! - [`status`]: two-tier `squeue`/`sacct` state lookup

pub mod status;
pub mod submit;

pub use status::{normalize_accounting_state, query_job_status};
pub use submit::{Submission, SubmitRequest, log_template, parse_job_id, resolve_log_path, submit_job};
