mod migrations;

use crate::db::NewExperiment;
use crate::types::{ArtifactSource, JobStatus};

fn sample_experiment(name: &str) -> NewExperiment {
    NewExperiment {
        name: name.to_string(),
        remote: "user@host".to_string(),
        script_path: "/a/b.sh".to_string(),
        args: vec!["--epochs".to_string(), "10".to_string()],
        git_commit: Some("abc123".to_string()),
        git_branch: Some("main".to_string()),
        job_id: "4242".to_string(),
        job_status: JobStatus::submitted(),
        log_path: "/logs/run1-4242.out".to_string(),
        artifact_remote: Some("/data/out".to_string()),
        artifact_sources: vec![ArtifactSource::new(
            "/data/out",
            vec![r"\.json$".to_string()],
        )],
        artifact_pattern: r"\.json$".to_string(),
        artifact_since_start: true,
    }
}
