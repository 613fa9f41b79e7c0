//! Text rendering for command results printed to stdout

use crate::artifacts::sources::split_patterns;
use crate::config::RunParams;
use crate::types::{Experiment, ExperimentSummary};
use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt::Write;

fn rfc3339(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Fixed-width table for `exp list`
pub fn format_list(rows: &[ExperimentSummary]) -> String {
    let mut out = format!(
        "{:<5} {:<25} {:<22} {:<10} {:<12} {:<20}\n",
        "ID", "NAME", "REMOTE", "JOB_ID", "STATUS", "CREATED_AT"
    );
    for row in rows {
        let _ = writeln!(
            out,
            "{:<5} {:<25} {:<22} {:<10} {:<12} {:<20}",
            row.id,
            row.name,
            row.remote,
            row.job_id,
            row.job_status,
            rfc3339(&row.created_at)
        );
    }
    out
}

/// Detail view for `exp show`
pub fn format_show(exp: &Experiment) -> String {
    let mut out = String::new();
    let opt = |v: &Option<String>| v.clone().unwrap_or_default();

    let _ = writeln!(out, "Experiment {}", exp.id);
    let _ = writeln!(out, "-------------");
    let _ = writeln!(out, "Name:        {}", exp.name);
    let _ = writeln!(out, "Remote:      {}", exp.remote);
    let _ = writeln!(out, "Job ID:      {}", exp.job_id);
    let _ = writeln!(out, "Job status:  {}", exp.job_status);
    let _ = writeln!(out, "Script:      {}", exp.script_path);
    let _ = writeln!(out, "Args:        {}", serde_json::to_string(&exp.args).unwrap_or_default());
    let _ = writeln!(out, "Git commit:  {}", opt(&exp.git_commit));
    let _ = writeln!(out, "Git branch:  {}", opt(&exp.git_branch));
    let _ = writeln!(out, "Remote log:  {}", exp.log_path);
    let _ = writeln!(out, "Created at:  {}", rfc3339(&exp.created_at));
    if let Some(done) = &exp.completed_at {
        let _ = writeln!(out, "Completed:   {}", rfc3339(done));
    }

    let sources = exp.effective_artifact_sources();
    if !sources.is_empty() {
        let _ = writeln!(out, "Artifacts");
        for source in &sources {
            let _ = writeln!(out, "  Remote:    {}", source.path);
        }
        let _ = writeln!(out, "  Dest:      {}", opt(&exp.artifact_dest));
        match split_patterns(&exp.artifact_pattern).as_slice() {
            [] => {
                let _ = writeln!(out, "  Pattern:   (none)");
            }
            [single] => {
                let _ = writeln!(out, "  Pattern:   {}", single);
            }
            many => {
                let _ = writeln!(out, "  Patterns:");
                for p in many {
                    let _ = writeln!(out, "    - {}", p);
                }
            }
        }
        let _ = writeln!(out, "  Since start filter: {}", exp.artifact_since_start);
        if let Some(synced) = &exp.artifact_last_sync {
            let _ = writeln!(out, "  Last sync: {}", rfc3339(synced));
        }
        if let Some(err) = &exp.artifact_last_error {
            let _ = writeln!(out, "  Last error: {}", err);
        }
    }

    if let Some(snapshot) = exp.config_snapshot.as_deref().filter(|s| !s.is_empty()) {
        let _ = writeln!(out, "Config snapshot:");
        let pretty = serde_json::from_str::<serde_json::Value>(snapshot)
            .and_then(|v| serde_json::to_string_pretty(&v))
            .unwrap_or_else(|_| snapshot.to_string());
        for line in pretty.lines() {
            let _ = writeln!(out, "  {}", line);
        }
    }
    out
}

/// Lines printed right after a successful submission
pub fn format_submission(exp: &Experiment, params: &RunParams) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Remote:       {}", exp.remote);
    let _ = writeln!(out, "Submitted job {} via ssh", exp.job_id);
    let _ = writeln!(out, "Recorded experiment {} locally", exp.id);
    let _ = writeln!(out, "Remote log will be at: {}", exp.log_path);
    if let (Some(first), Some(dest)) = (params.artifact_sources.first(), &exp.artifact_dest) {
        let _ = writeln!(out, "Artifacts:    {} -> {}", first.path, dest);
        for extra in params.artifact_sources.iter().skip(1) {
            let _ = writeln!(out, "              {} -> {}", extra.path, dest);
        }
    }
    out
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ArtifactSource, ExperimentId, JobStatus};
    use chrono::TimeZone;

    fn experiment() -> Experiment {
        Experiment {
            id: ExperimentId(3),
            name: "run1".into(),
            remote: "user@host".into(),
            script_path: "/a/b.sh".into(),
            args: vec!["--lr".into(), "0.1".into()],
            git_commit: Some("abc123".into()),
            git_branch: None,
            job_id: "4242".into(),
            job_status: JobStatus::new("COMPLETED"),
            log_path: "/logs/run1-4242.out".into(),
            created_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
            completed_at: None,
            artifact_remote: Some("/data/out".into()),
            artifact_dest: Some("/tmp/results/3".into()),
            artifact_sources: vec![ArtifactSource::new("/data/out", vec![])],
            artifact_pattern: "\\.json$\n\\.csv$".into(),
            artifact_since_start: true,
            artifact_last_sync: None,
            artifact_last_error: Some("rsync from user@host:/data/out/ failed (exit 23)".into()),
            config_snapshot: Some(r#"{"name":"run1"}"#.into()),
        }
    }

    #[test]
    fn test_list_columns() {
        let exp = experiment();
        let rows = vec![ExperimentSummary {
            id: exp.id,
            name: exp.name.clone(),
            remote: exp.remote.clone(),
            job_id: exp.job_id.clone(),
            job_status: exp.job_status.clone(),
            created_at: exp.created_at,
        }];
        let table = format_list(&rows);
        let lines: Vec<&str> = table.lines().collect();
        assert!(lines[0].starts_with("ID    NAME"));
        assert!(lines[1].starts_with("3     run1"));
        assert!(lines[1].contains("2026-03-01T12:00:00Z"));
        assert_eq!(lines[0].find("REMOTE"), lines[1].find("user@host"));
    }

    #[test]
    fn test_show_lists_patterns_and_error() {
        let text = format_show(&experiment());
        assert!(text.contains("Experiment 3\n"));
        assert!(text.contains("Args:        [\"--lr\",\"0.1\"]\n"));
        assert!(text.contains("  Patterns:\n    - \\.json$\n    - \\.csv$\n"));
        assert!(text.contains("  Last error: rsync from"));
        assert!(text.contains("Config snapshot:\n  {\n    \"name\": \"run1\"\n  }\n"));
        assert!(!text.contains("Completed:"));
    }

    #[test]
    fn test_show_single_pattern() {
        let mut exp = experiment();
        exp.artifact_pattern = "\\.json$".into();
        assert!(format_show(&exp).contains("  Pattern:   \\.json$\n"));
    }
}
