//! Core types for exp-tracker

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::artifacts::sources::split_patterns;

/// Locally assigned identifier for an experiment
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExperimentId(pub i64);

impl ExperimentId {
    /// Create a new ExperimentId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for ExperimentId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<ExperimentId> for i64 {
    fn from(id: ExperimentId) -> Self {
        id.0
    }
}

impl std::fmt::Display for ExperimentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ExperimentId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

impl sqlx::Type<sqlx::Sqlite> for ExperimentId {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <i64 as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <i64 as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for ExperimentId {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for ExperimentId {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let id = <i64 as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(Self(id))
    }
}

/// Scheduler states in which the job is still being tracked
pub const ACTIVE_STATES: &[&str] = &[
    "PENDING",
    "CONFIGURING",
    "RUNNING",
    "COMPLETING",
    "SUSPENDED",
    "RESV_DEL_HOLD",
    "SPECIAL_EXIT",
];

/// Scheduler job state as reported by `squeue`/`sacct`
///
/// Free-form on purpose: Slurm grows new states between releases, and the
/// only decision the engine makes is active vs terminal.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobStatus(String);

impl JobStatus {
    /// Bookkeeping status recorded before the first poll
    pub const SUBMITTED: &'static str = "SUBMITTED";
    /// Reported when neither the queue nor accounting know the job
    pub const UNKNOWN: &'static str = "UNKNOWN";

    /// Wrap a raw scheduler state
    pub fn new(status: impl Into<String>) -> Self {
        Self(status.into())
    }

    /// Status stored right after `sbatch` returns
    pub fn submitted() -> Self {
        Self::new(Self::SUBMITTED)
    }

    /// Status used when the scheduler cannot be asked or has forgotten the job
    pub fn unknown() -> Self {
        Self::new(Self::UNKNOWN)
    }

    /// Raw status text
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the scheduler still tracks the job
    ///
    /// Comparison is case-insensitive on the trimmed value. Anything outside
    /// [`ACTIVE_STATES`], including empty or garbage text, is terminal.
    pub fn is_active(&self) -> bool {
        let normalized = self.0.trim().to_ascii_uppercase();
        ACTIVE_STATES.contains(&normalized.as_str())
    }

    /// Inverse of [`JobStatus::is_active`]
    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobStatus {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A remote directory tree and the filter patterns applied to files under it
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSource {
    /// Absolute path on the remote host
    pub path: String,
    /// Regular expressions; empty accepts every file
    #[serde(rename = "artifact_patterns", alias = "patterns", default)]
    pub patterns: Vec<String>,
}

impl ArtifactSource {
    /// Create a source from a path and its patterns
    pub fn new(path: impl Into<String>, patterns: Vec<String>) -> Self {
        Self {
            path: path.into(),
            patterns,
        }
    }
}

/// One submission attempt and everything known about it
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    /// Local identifier
    pub id: ExperimentId,
    /// Logical name given at submission
    pub name: String,
    /// Remote host address (user@host)
    pub remote: String,
    /// Batch script path on the remote host
    pub script_path: String,
    /// Arguments passed to the batch script
    pub args: Vec<String>,
    /// Commit hash at submission time
    pub git_commit: Option<String>,
    /// Branch name at submission time
    pub git_branch: Option<String>,
    /// Scheduler job id
    pub job_id: String,
    /// Last persisted scheduler state
    pub job_status: JobStatus,
    /// Remote log file with the job id substituted
    pub log_path: String,
    /// When the experiment was submitted
    pub created_at: DateTime<Utc>,
    /// When a terminal state was first observed
    pub completed_at: Option<DateTime<Utc>>,
    /// Legacy primary artifact path (first source path)
    pub artifact_remote: Option<String>,
    /// Per-experiment local destination (`<dest>/<id>`)
    pub artifact_dest: Option<String>,
    /// Configured artifact sources, in transfer order
    pub artifact_sources: Vec<ArtifactSource>,
    /// Combined filter patterns joined by newline
    pub artifact_pattern: String,
    /// Only fetch files modified after submission
    pub artifact_since_start: bool,
    /// Time of the last successful sync
    pub artifact_last_sync: Option<DateTime<Utc>>,
    /// Error message of the last failed sync
    pub artifact_last_error: Option<String>,
    /// JSON snapshot of the resolved run parameters
    pub config_snapshot: Option<String>,
}

impl Experiment {
    /// Artifact sources to use for discovery
    ///
    /// Explicit sources win. Otherwise a legacy path/pattern pair is turned
    /// into a single source. With neither, the list is empty.
    pub fn effective_artifact_sources(&self) -> Vec<ArtifactSource> {
        if !self.artifact_sources.is_empty() {
            return self.artifact_sources.clone();
        }
        match self.artifact_remote.as_deref().map(str::trim) {
            Some(path) if !path.is_empty() => vec![ArtifactSource::new(
                path,
                split_patterns(&self.artifact_pattern),
            )],
            _ => Vec::new(),
        }
    }

    /// Whether a sync would have anything to do
    pub fn has_artifact_config(&self) -> bool {
        self.artifact_dest.as_deref().is_some_and(|d| !d.is_empty())
            && !self.effective_artifact_sources().is_empty()
    }
}

/// Row shown by `exp list`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExperimentSummary {
    /// Local identifier
    pub id: ExperimentId,
    /// Logical name
    pub name: String,
    /// Remote host
    pub remote: String,
    /// Scheduler job id
    pub job_id: String,
    /// Last persisted status
    pub job_status: JobStatus,
    /// Submission time
    pub created_at: DateTime<Utc>,
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn experiment() -> Experiment {
        Experiment {
            id: ExperimentId(1),
            name: "run1".into(),
            remote: "user@host".into(),
            script_path: "/a/b.sh".into(),
            args: vec![],
            git_commit: None,
            git_branch: None,
            job_id: "123".into(),
            job_status: JobStatus::submitted(),
            log_path: "/logs/run1-123.out".into(),
            created_at: Utc::now(),
            completed_at: None,
            artifact_remote: None,
            artifact_dest: None,
            artifact_sources: vec![],
            artifact_pattern: String::new(),
            artifact_since_start: true,
            artifact_last_sync: None,
            artifact_last_error: None,
            config_snapshot: None,
        }
    }

    #[test]
    fn test_active_states() {
        for state in ACTIVE_STATES {
            assert!(JobStatus::new(*state).is_active(), "{state} should be active");
        }
        assert!(JobStatus::new("  running \n").is_active());
        assert!(JobStatus::new("Pending").is_active());
    }

    #[test]
    fn test_terminal_states() {
        for state in [
            "COMPLETED",
            "FAILED",
            "CANCELLED",
            "TIMEOUT",
            "UNKNOWN",
            "SUBMITTED",
            "",
            "   ",
            "garbage",
            "RUNNING+",
        ] {
            assert!(JobStatus::new(state).is_terminal(), "{state:?} should be terminal");
        }
    }

    #[test]
    fn test_experiment_id_parse_and_display() {
        let id: ExperimentId = " 42 ".parse().unwrap();
        assert_eq!(id, ExperimentId(42));
        assert_eq!(id.to_string(), "42");
        assert!("abc".parse::<ExperimentId>().is_err());
    }

    #[test]
    fn test_artifact_source_serde_names() {
        let source: ArtifactSource =
            serde_json::from_str(r#"{"path":"/data","artifact_patterns":["\\.json$"]}"#).unwrap();
        assert_eq!(source.patterns, vec![r"\.json$".to_string()]);

        let aliased: ArtifactSource =
            serde_json::from_str(r#"{"path":"/data","patterns":["a"]}"#).unwrap();
        assert_eq!(aliased.patterns, vec!["a".to_string()]);

        let bare: ArtifactSource = serde_json::from_str(r#"{"path":"/data"}"#).unwrap();
        assert!(bare.patterns.is_empty());
    }

    #[test]
    fn test_effective_sources_prefers_explicit() {
        let mut exp = experiment();
        exp.artifact_remote = Some("/legacy".into());
        exp.artifact_sources = vec![ArtifactSource::new("/data/out", vec![])];
        let sources = exp.effective_artifact_sources();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].path, "/data/out");
    }

    #[test]
    fn test_effective_sources_synthesizes_legacy() {
        let mut exp = experiment();
        exp.artifact_remote = Some("/legacy".into());
        exp.artifact_pattern = "\\.json$\n\\.csv$".into();
        let sources = exp.effective_artifact_sources();
        assert_eq!(
            sources,
            vec![ArtifactSource::new(
                "/legacy",
                vec!["\\.json$".into(), "\\.csv$".into()]
            )]
        );
    }

    #[test]
    fn test_effective_sources_empty() {
        let mut exp = experiment();
        assert!(exp.effective_artifact_sources().is_empty());
        exp.artifact_remote = Some("  ".into());
        assert!(exp.effective_artifact_sources().is_empty());
        assert!(!exp.has_artifact_config());
    }
}
