//! Source-control metadata recorded with each experiment
//!
//! The repository that matters is the one the job runs from, so the remote
//! host is asked first (script directory, then artifact tree). When none of
//! those is a git checkout the local working directory is used. Every step is
//! best-effort: failures only leave the fields empty.

use crate::remote::{RemoteExecutor, run_login_shell};
use crate::utils::single_quote;
use std::path::Path;
use tokio::process::Command;

/// Commit and branch at submission time
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GitInfo {
    /// Full commit hash
    pub commit: Option<String>,
    /// Branch name (`HEAD` when detached)
    pub branch: Option<String>,
}

impl GitInfo {
    /// Whether anything was found
    pub fn is_empty(&self) -> bool {
        self.commit.is_none() && self.branch.is_none()
    }
}

fn first_line(output: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
}

fn remote_rev_parse_script(dir: &str, rev_args: &str) -> String {
    format!(
        "cd {} && env GIT_DISCOVERY_ACROSS_FILESYSTEM=1 git rev-parse {}",
        single_quote(dir),
        rev_args
    )
}

/// Directories to try on the remote host, in order
///
/// The script's parent directory comes first (skipped when the script path
/// has no directory part), then the artifact root. Blank entries are dropped.
pub fn candidate_dirs(script_path: &str, artifact_root: Option<&str>) -> Vec<String> {
    let mut dirs = Vec::new();
    if let Some(parent) = Path::new(script_path.trim()).parent() {
        let parent = parent.to_string_lossy();
        if !parent.is_empty() && parent != "." {
            dirs.push(parent.into_owned());
        }
    }
    if let Some(root) = artifact_root.map(str::trim).filter(|r| !r.is_empty())
        && !dirs.iter().any(|d| d == root)
    {
        dirs.push(root.to_string());
    }
    dirs
}

/// Ask the remote host for the commit and branch of the checkout containing `dir`
///
/// Returns `None` unless the commit lookup succeeds. The branch is taken
/// when its own lookup succeeds.
pub async fn remote_git_info(executor: &dyn RemoteExecutor, host: &str, dir: &str) -> Option<GitInfo> {
    let commit = match run_login_shell(executor, host, &remote_rev_parse_script(dir, "HEAD")).await {
        Ok(out) if out.success() => first_line(&out.stdout)?,
        Ok(out) => {
            tracing::debug!(host, dir, stderr = %out.stderr.trim(), "No git checkout on remote");
            return None;
        }
        Err(e) => {
            tracing::debug!(host, dir, error = %e, "Remote git lookup failed");
            return None;
        }
    };

    let branch = match run_login_shell(executor, host, &remote_rev_parse_script(dir, "--abbrev-ref HEAD")).await {
        Ok(out) if out.success() => first_line(&out.stdout),
        _ => None,
    };

    Some(GitInfo {
        commit: Some(commit),
        branch,
    })
}

async fn local_rev_parse(args: &[&str]) -> Option<String> {
    let output = Command::new("git")
        .arg("rev-parse")
        .args(args)
        .stdin(std::process::Stdio::null())
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    first_line(&String::from_utf8_lossy(&output.stdout))
}

/// Commit and branch of the local working directory
pub async fn local_git_info() -> GitInfo {
    GitInfo {
        commit: local_rev_parse(&["HEAD"]).await,
        branch: local_rev_parse(&["--abbrev-ref", "HEAD"]).await,
    }
}

/// Try each remote directory in order, then the local checkout
pub async fn lookup_git_info(executor: &dyn RemoteExecutor, host: &str, dirs: &[String]) -> GitInfo {
    for dir in dirs {
        if let Some(info) = remote_git_info(executor, host, dir).await {
            tracing::debug!(host, dir = %dir, commit = ?info.commit, "Using remote git metadata");
            return info;
        }
    }
    local_git_info().await
}
