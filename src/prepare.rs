//! Pre-submission steps on the remote host
//!
//! - running a local build script remotely (written to a temp file through a
//!   quoted heredoc, executed, removed)
//! - uploading a local batch script to the path `sbatch` will run

use crate::artifacts::FileTransfer;
use crate::error::{Error, Result};
use crate::remote::{RemoteExecutor, run_login_shell};
use crate::utils::{require_local_file, single_quote};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

fn unique_suffix() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("{}-{}", nanos, std::process::id())
}

/// Shell payload that materializes `contents` at `remote_path`, runs it and removes it
///
/// `marker` terminates the heredoc; it must not appear alone on a line of
/// `contents`. A missing trailing newline is added.
pub fn build_script_payload(contents: &str, remote_path: &str, marker: &str) -> String {
    let mut body = contents.to_string();
    if !body.ends_with('\n') {
        body.push('\n');
    }
    let quoted = single_quote(remote_path);
    format!(
        "set -eo pipefail\ncat > {quoted} <<'{marker}'\n{body}{marker}\nchmod +x {quoted}\nbash {quoted}\nrm -f {quoted}\n"
    )
}

/// Run a local build script on the remote host
///
/// The script must exist locally. A non-zero exit is fatal and carries the
/// remote stderr.
pub async fn run_build_script(executor: &dyn RemoteExecutor, host: &str, local: &Path) -> Result<()> {
    require_local_file(local)?;
    let contents = tokio::fs::read_to_string(local)
        .await
        .map_err(|e| Error::InvalidPath {
            path: local.to_path_buf(),
            reason: format!("cannot read build script: {}", e),
        })?;

    let suffix = unique_suffix();
    let remote_path = format!("/tmp/exp-build-{}.sh", suffix);
    let marker = format!("EXP_BUILD_{}", suffix.replace('-', "_"));
    let payload = build_script_payload(&contents, &remote_path, &marker);

    tracing::info!(host, script = %local.display(), "Running build script on remote");
    let output = run_login_shell(executor, host, &payload).await?;
    let label = format!("build script {}", local.display());
    let output = output.check(host, &label)?;
    if !output.stdout.trim().is_empty() {
        tracing::debug!(host, output = %output.stdout.trim_end(), "Build script output");
    }
    Ok(())
}

/// Copy a local batch script to `remote_path` on the host
pub async fn upload_script(
    transfer: &dyn FileTransfer,
    host: &str,
    local: &Path,
    remote_path: &str,
) -> Result<()> {
    require_local_file(local)?;
    tracing::info!(host, local = %local.display(), remote_path, "Uploading batch script");
    transfer.push(host, local, remote_path).await
}
