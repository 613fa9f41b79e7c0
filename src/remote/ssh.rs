//! ssh-based remote executor

use super::{CommandOutput, RemoteExecutor};
use crate::utils::shell_quote;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

/// Executes commands on the remote host with the system `ssh` client
///
/// The program and its arguments are shell-quoted into one command line, so
/// the remote login shell sees exactly the argument vector given to
/// [`RemoteExecutor::exec`]. Authentication is left to the user's ssh
/// configuration (agent, keys, `~/.ssh/config`).
///
/// # Examples
///
/// ```no_run
/// use exp_tracker::remote::{RemoteExecutor, SshExecutor};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let ssh = SshExecutor::from_path().expect("ssh not found in PATH");
/// let out = ssh.exec("user@cluster", "hostname", &[]).await?;
/// println!("{}", out.stdout.trim());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SshExecutor {
    binary_path: PathBuf,
}

impl SshExecutor {
    /// Create an executor with an explicit ssh binary
    pub fn new(binary_path: PathBuf) -> Self {
        Self { binary_path }
    }

    /// Attempt to find `ssh` in PATH
    pub fn from_path() -> Option<Self> {
        which::which("ssh").ok().map(Self::new)
    }
}

/// Build the single command line ssh hands to the remote shell
pub fn remote_command_line(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .map(shell_quote)
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    async fn exec(&self, host: &str, program: &str, args: &[String]) -> crate::Result<CommandOutput> {
        let line = remote_command_line(program, args);
        tracing::debug!(host, command = %line, "Running remote command");

        let output = Command::new(&self.binary_path)
            .arg(host)
            .arg("--")
            .arg(&line)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| crate::Error::ExternalTool(format!("Failed to execute ssh: {}", e)))?;

        let output = CommandOutput::from(output);
        tracing::debug!(host, exit_code = ?output.exit_code, "Remote command finished");
        Ok(output)
    }

    fn name(&self) -> &'static str {
        "ssh"
    }
}
