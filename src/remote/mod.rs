//! Remote command execution
//!
//! Every interaction with the cluster goes through [`RemoteExecutor`]: job
//! submission, status queries, file listing, build scripts and git lookups.
//! The production implementation is [`SshExecutor`]; tests inject scripted
//! executors.

use crate::error::{RemoteError, Result};
use async_trait::async_trait;

mod ssh;

pub use ssh::{SshExecutor, remote_command_line};

/// Captured result of a finished command
#[must_use]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when the process was killed by a signal
    pub exit_code: Option<i32>,
    /// Standard output, lossily decoded
    pub stdout: String,
    /// Standard error, lossily decoded
    pub stderr: String,
}

impl CommandOutput {
    /// Build an output record from its parts
    pub fn new(exit_code: Option<i32>, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// Whether the command exited with status 0
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Error stream followed by the standard stream
    pub fn combined(&self) -> String {
        let mut out = String::with_capacity(self.stderr.len() + self.stdout.len());
        out.push_str(&self.stderr);
        out.push_str(&self.stdout);
        out
    }

    /// Turn a non-zero exit into [`RemoteError::CommandFailed`]
    pub fn check(self, host: &str, command: &str) -> Result<Self> {
        if self.success() {
            return Ok(self);
        }
        Err(RemoteError::CommandFailed {
            host: host.to_string(),
            command: command.to_string(),
            exit_code: self.exit_code,
            stderr: self.stderr.trim().to_string(),
        }
        .into())
    }
}

impl From<std::process::Output> for CommandOutput {
    fn from(output: std::process::Output) -> Self {
        Self {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

/// Runs one command on a remote host and captures its output
///
/// A non-zero exit is not an error at this level: callers decide whether it
/// is fatal, transient or best-effort. Only a failure to run the command at
/// all (missing binary, spawn error) is returned as `Err`.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Run `program args...` on `host`
    async fn exec(&self, host: &str, program: &str, args: &[String]) -> Result<CommandOutput>;

    /// Get the name of this implementation
    fn name(&self) -> &'static str;
}

/// Run a script on the remote host through a login shell (`bash -lc`)
pub async fn run_login_shell(
    executor: &dyn RemoteExecutor,
    host: &str,
    script: &str,
) -> Result<CommandOutput> {
    executor
        .exec(host, "bash", &["-lc".to_string(), script.to_string()])
        .await
}
