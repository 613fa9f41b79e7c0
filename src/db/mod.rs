//! Database layer for exp-tracker
//!
//! Handles SQLite persistence for experiment records.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`]: Database lifecycle, schema migrations
//! - [`experiments`]: Experiment CRUD and lifecycle field updates

use crate::error::DatabaseError;
use crate::types::{ArtifactSource, Experiment, ExperimentId, ExperimentSummary, JobStatus};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, sqlite::SqlitePool};

mod experiments;
mod migrations;

/// New experiment to be inserted into the database
#[derive(Debug, Clone)]
pub struct NewExperiment {
    /// Logical name
    pub name: String,
    /// Remote host (user@host)
    pub remote: String,
    /// Batch script path on the remote host
    pub script_path: String,
    /// Arguments passed to the script
    pub args: Vec<String>,
    /// Commit hash, if one could be determined
    pub git_commit: Option<String>,
    /// Branch name, if one could be determined
    pub git_branch: Option<String>,
    /// Scheduler job id
    pub job_id: String,
    /// Initial status (normally SUBMITTED)
    pub job_status: JobStatus,
    /// Remote log path with the job id substituted
    pub log_path: String,
    /// Legacy primary artifact path
    pub artifact_remote: Option<String>,
    /// Configured artifact sources
    pub artifact_sources: Vec<ArtifactSource>,
    /// Combined patterns joined by newline
    pub artifact_pattern: String,
    /// Only fetch files modified after submission
    pub artifact_since_start: bool,
}

/// Experiment record as stored in SQLite
#[derive(Debug, Clone, FromRow)]
pub(crate) struct ExperimentRow {
    pub id: i64,
    pub name: String,
    pub remote: String,
    pub script_path: String,
    pub args: String,
    pub git_commit: Option<String>,
    pub git_branch: Option<String>,
    pub job_id: String,
    pub job_status: String,
    pub log_path: String,
    pub created_at: i64,
    pub completed_at: Option<i64>,
    pub artifact_remote: Option<String>,
    pub artifact_dest: Option<String>,
    pub artifact_sources: Option<String>,
    pub artifact_pattern: String,
    pub artifact_since_start: bool,
    pub artifact_last_sync: Option<i64>,
    pub artifact_last_error: Option<String>,
    pub config_snapshot: Option<String>,
}

/// Row used by the list view
#[derive(Debug, Clone, FromRow)]
pub(crate) struct SummaryRow {
    pub id: i64,
    pub name: String,
    pub remote: String,
    pub job_id: String,
    pub job_status: String,
    pub created_at: i64,
}

fn timestamp(id: i64, secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| {
        Error::Database(DatabaseError::CorruptRecord {
            id,
            reason: format!("timestamp out of range: {}", secs),
        })
    })
}

fn decode_json<T: serde::de::DeserializeOwned>(id: i64, column: &str, raw: &str) -> Result<T> {
    serde_json::from_str(raw).map_err(|e| {
        Error::Database(DatabaseError::CorruptRecord {
            id,
            reason: format!("invalid {} JSON: {}", column, e),
        })
    })
}

impl TryFrom<ExperimentRow> for Experiment {
    type Error = Error;

    fn try_from(row: ExperimentRow) -> Result<Self> {
        let id = row.id;
        let args: Vec<String> = if row.args.trim().is_empty() {
            Vec::new()
        } else {
            decode_json(id, "args", &row.args)?
        };
        let artifact_sources: Vec<ArtifactSource> = match row.artifact_sources.as_deref() {
            Some(raw) if !raw.trim().is_empty() => decode_json(id, "artifact_sources", raw)?,
            _ => Vec::new(),
        };

        Ok(Experiment {
            id: ExperimentId(id),
            name: row.name,
            remote: row.remote,
            script_path: row.script_path,
            args,
            git_commit: row.git_commit.filter(|s| !s.is_empty()),
            git_branch: row.git_branch.filter(|s| !s.is_empty()),
            job_id: row.job_id,
            job_status: JobStatus::new(row.job_status),
            log_path: row.log_path,
            created_at: timestamp(id, row.created_at)?,
            completed_at: row.completed_at.map(|t| timestamp(id, t)).transpose()?,
            artifact_remote: row.artifact_remote.filter(|s| !s.is_empty()),
            artifact_dest: row.artifact_dest.filter(|s| !s.is_empty()),
            artifact_sources,
            artifact_pattern: row.artifact_pattern,
            artifact_since_start: row.artifact_since_start,
            artifact_last_sync: row.artifact_last_sync.map(|t| timestamp(id, t)).transpose()?,
            artifact_last_error: row.artifact_last_error.filter(|s| !s.is_empty()),
            config_snapshot: row.config_snapshot.filter(|s| !s.is_empty()),
        })
    }
}

impl TryFrom<SummaryRow> for ExperimentSummary {
    type Error = Error;

    fn try_from(row: SummaryRow) -> Result<Self> {
        Ok(ExperimentSummary {
            id: ExperimentId(row.id),
            name: row.name,
            remote: row.remote,
            job_id: row.job_id,
            job_status: JobStatus::new(row.job_status),
            created_at: timestamp(row.id, row.created_at)?,
        })
    }
}

/// Database handle for exp-tracker
pub struct Database {
    pool: SqlitePool,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
