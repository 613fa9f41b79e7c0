//! Experiment CRUD and lifecycle field updates.

use crate::error::DatabaseError;
use crate::types::{Experiment, ExperimentId, ExperimentSummary, JobStatus};
use crate::{Error, Result};
use chrono::{DateTime, Utc};

use super::{Database, ExperimentRow, NewExperiment, SummaryRow};

impl Database {
    /// Insert a new experiment record
    pub async fn insert_experiment(&self, experiment: &NewExperiment) -> Result<ExperimentId> {
        self.insert_experiment_at(experiment, Utc::now()).await
    }

    /// Insert a new experiment record with an explicit creation time
    pub async fn insert_experiment_at(
        &self,
        experiment: &NewExperiment,
        created_at: DateTime<Utc>,
    ) -> Result<ExperimentId> {
        let args = serde_json::to_string(&experiment.args)?;
        let sources = if experiment.artifact_sources.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&experiment.artifact_sources)?)
        };

        let result = sqlx::query(
            r#"
            INSERT INTO experiments (
                name, remote, script_path, args, git_commit, git_branch,
                job_id, job_status, log_path, created_at,
                artifact_remote, artifact_sources, artifact_pattern, artifact_since_start
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&experiment.name)
        .bind(&experiment.remote)
        .bind(&experiment.script_path)
        .bind(args)
        .bind(&experiment.git_commit)
        .bind(&experiment.git_branch)
        .bind(&experiment.job_id)
        .bind(experiment.job_status.as_str())
        .bind(&experiment.log_path)
        .bind(created_at.timestamp())
        .bind(&experiment.artifact_remote)
        .bind(sources)
        .bind(&experiment.artifact_pattern)
        .bind(experiment.artifact_since_start)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert experiment: {}",
                e
            )))
        })?;

        Ok(ExperimentId(result.last_insert_rowid()))
    }

    /// Record the per-experiment destination and the resolved config snapshot
    pub async fn set_artifact_dest(
        &self,
        id: ExperimentId,
        dest: Option<&str>,
        config_snapshot: Option<&str>,
    ) -> Result<()> {
        sqlx::query("UPDATE experiments SET artifact_dest = ?, config_snapshot = ? WHERE id = ?")
            .bind(dest)
            .bind(config_snapshot)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to update artifact destination: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Persist a status observed by the poller
    ///
    /// `completed_at` is only written when given, so an earlier completion
    /// time is never cleared.
    pub async fn update_status(
        &self,
        id: ExperimentId,
        status: &JobStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE experiments
            SET job_status = ?, completed_at = COALESCE(?, completed_at)
            WHERE id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(completed_at.map(|t| t.timestamp()))
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to update job status: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Record the outcome of an artifact sync
    ///
    /// A successful sync passes `synced_at` and no error, which clears any
    /// previous error. A failed sync passes the error and leaves the last
    /// successful timestamp alone.
    pub async fn record_artifact_sync(
        &self,
        id: ExperimentId,
        synced_at: Option<DateTime<Utc>>,
        error: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE experiments
            SET artifact_last_sync = COALESCE(?, artifact_last_sync),
                artifact_last_error = ?
            WHERE id = ?
            "#,
        )
        .bind(synced_at.map(|t| t.timestamp()))
        .bind(error)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to record artifact sync: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Get an experiment by ID
    pub async fn get_experiment(&self, id: ExperimentId) -> Result<Option<Experiment>> {
        let row = sqlx::query_as::<_, ExperimentRow>(
            r#"
            SELECT
                id, name, remote, script_path, args, git_commit, git_branch,
                job_id, job_status, log_path, created_at, completed_at,
                artifact_remote, artifact_dest, artifact_sources, artifact_pattern,
                artifact_since_start, artifact_last_sync, artifact_last_error,
                config_snapshot
            FROM experiments
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get experiment: {}",
                e
            )))
        })?;

        row.map(Experiment::try_from).transpose()
    }

    /// List all experiments, newest first
    pub async fn list_experiments(&self) -> Result<Vec<ExperimentSummary>> {
        let rows = sqlx::query_as::<_, SummaryRow>(
            r#"
            SELECT id, name, remote, job_id, job_status, created_at
            FROM experiments
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list experiments: {}",
                e
            )))
        })?;

        rows.into_iter().map(ExperimentSummary::try_from).collect()
    }
}
