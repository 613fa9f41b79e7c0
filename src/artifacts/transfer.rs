//! Bulk copy via rsync (artifacts) and scp (script upload)

use crate::error::{RemoteError, Result};
use crate::utils::shell_join;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// A manifest-driven copy of files from one remote root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    /// Remote host (user@host)
    pub host: String,
    /// Absolute source root on the remote host
    pub root: String,
    /// Paths relative to `root`
    pub files: Vec<String>,
    /// Local destination directory
    pub dest: PathBuf,
}

/// Trait for moving files between the local machine and the remote host
///
/// Byte transfer is always delegated to an external tool; implementations
/// only decide how to invoke it.
#[async_trait]
pub trait FileTransfer: Send + Sync {
    /// Copy the listed files from the remote root into the destination
    ///
    /// An empty file list performs no transfer.
    async fn pull(&self, request: &PullRequest) -> Result<()>;

    /// Upload one local file to an exact remote path
    async fn push(&self, host: &str, local: &Path, remote_path: &str) -> Result<()>;

    /// Get the name of this implementation
    fn name(&self) -> &'static str;
}

/// `host:root/` as rsync expects it, with exactly one trailing slash
pub fn source_spec(host: &str, root: &str) -> String {
    let trimmed = root.trim_end_matches('/');
    format!("{}:{}/", host, trimmed)
}

/// Newline-terminated file list fed to `--files-from=-`
pub fn manifest(files: &[String]) -> String {
    let mut out = String::new();
    for file in files {
        out.push_str(file);
        out.push('\n');
    }
    out
}

/// rsync/scp based transfer
///
/// # Examples
///
/// ```no_run
/// use exp_tracker::artifacts::{FileTransfer, PullRequest, RsyncTransfer};
/// use std::path::PathBuf;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let transfer = RsyncTransfer::from_path().expect("rsync/scp not found in PATH");
/// transfer
///     .pull(&PullRequest {
///         host: "user@cluster".into(),
///         root: "/scratch/run1".into(),
///         files: vec!["metrics.json".into()],
///         dest: PathBuf::from("/tmp/results/1"),
///     })
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RsyncTransfer {
    rsync: PathBuf,
    scp: PathBuf,
}

impl RsyncTransfer {
    /// Create with explicit binary paths
    pub fn new(rsync: PathBuf, scp: PathBuf) -> Self {
        Self { rsync, scp }
    }

    /// Attempt to find `rsync` and `scp` in PATH
    pub fn from_path() -> Option<Self> {
        let rsync = which::which("rsync").ok()?;
        let scp = which::which("scp").ok()?;
        Some(Self::new(rsync, scp))
    }
}

#[async_trait]
impl FileTransfer for RsyncTransfer {
    async fn pull(&self, request: &PullRequest) -> Result<()> {
        if request.files.is_empty() {
            return Ok(());
        }

        tokio::fs::create_dir_all(&request.dest).await?;

        let source = source_spec(&request.host, &request.root);
        let dest = request.dest.to_string_lossy().into_owned();
        tracing::info!(
            command = %shell_join(&["rsync", "-av", "--files-from=-", source.as_str(), dest.as_str()]),
            files = request.files.len(),
            "Starting rsync"
        );

        let mut child = Command::new(&self.rsync)
            .arg("-av")
            .arg("--files-from=-")
            .arg(&source)
            .arg(&request.dest)
            .stdin(Stdio::piped())
            .spawn()
            .map_err(|e| crate::Error::ExternalTool(format!("Failed to execute rsync: {}", e)))?;

        // rsync may exit before reading the whole list; its exit status wins
        let mut write_error = None;
        if let Some(mut stdin) = child.stdin.take() {
            let written = match stdin.write_all(manifest(&request.files).as_bytes()).await {
                Ok(()) => stdin.shutdown().await,
                Err(e) => Err(e),
            };
            if let Err(e) = written {
                tracing::debug!(source = %source, error = %e, "rsync stopped reading the file list");
                write_error = Some(e);
            }
        }

        let status = child.wait().await?;
        if !status.success() {
            return Err(RemoteError::TransferFailed {
                source_spec: source,
                exit_code: status.code(),
            }
            .into());
        }

        if let Some(e) = write_error {
            return Err(RemoteError::ManifestWriteFailed {
                source_spec: source,
                source: e,
            }
            .into());
        }

        Ok(())
    }

    async fn push(&self, host: &str, local: &Path, remote_path: &str) -> Result<()> {
        let target = format!("{}:{}", host, remote_path);
        tracing::info!(local = %local.display(), target = %target, "Uploading script");

        let output = Command::new(&self.scp)
            .arg(local)
            .arg(&target)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| crate::Error::ExternalTool(format!("Failed to execute scp: {}", e)))?;

        if !output.status.success() {
            return Err(RemoteError::CommandFailed {
                host: host.to_string(),
                command: format!("scp {} {}", local.display(), target),
                exit_code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
            .into());
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "rsync"
    }
}
