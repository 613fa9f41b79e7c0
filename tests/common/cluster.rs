//! In-memory stand-ins for the cluster and the copy tool

use async_trait::async_trait;
use exp_tracker::artifacts::transfer::manifest;
use exp_tracker::{CommandOutput, FileTransfer, PullRequest, RemoteError, RemoteExecutor, Result};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;

/// One command seen by [`FakeCluster`]
#[derive(Debug, Clone)]
pub struct Call {
    pub host: String,
    pub program: String,
    pub args: Vec<String>,
}

/// A Slurm cluster that answers from scripted state
///
/// - `sbatch` accepts every job and hands out ids from 1001
/// - `squeue` walks through the queued states, then reports nothing
/// - `sacct` reports the accounting state
/// - `bash -lc` serves directory listings; git lookups fail
#[derive(Default)]
pub struct FakeCluster {
    queue_states: Mutex<VecDeque<String>>,
    accounting_state: Mutex<String>,
    trees: Mutex<HashMap<String, Vec<String>>>,
    calls: Mutex<Vec<Call>>,
    next_job: Mutex<u64>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self {
            next_job: Mutex::new(1001),
            accounting_state: Mutex::new("COMPLETED".to_string()),
            ..Default::default()
        }
    }

    /// States `squeue` reports, one per query
    pub fn with_queue_states(self, states: &[&str]) -> Self {
        *self.queue_states.lock().unwrap() = states.iter().map(|s| s.to_string()).collect();
        self
    }

    /// State `sacct` reports once the job left the queue
    pub fn with_accounting_state(self, state: &str) -> Self {
        *self.accounting_state.lock().unwrap() = state.to_string();
        self
    }

    /// Files under an absolute root, relative to it
    pub fn with_tree(self, root: &str, files: &[&str]) -> Self {
        self.trees
            .lock()
            .unwrap()
            .insert(root.to_string(), files.iter().map(|f| f.to_string()).collect());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Listing scripts run through `bash -lc`
    pub fn listings(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.program == "bash" && c.args.get(1).is_some_and(|s| s.contains("find .")))
            .map(|c| c.args[1].clone())
            .collect()
    }

    fn listing(&self, script: &str) -> CommandOutput {
        let root = script
            .strip_prefix("cd '")
            .and_then(|rest| rest.split('\'').next())
            .unwrap_or_default();
        match self.trees.lock().unwrap().get(root) {
            Some(files) => {
                let stdout: String = files.iter().map(|f| format!("./{}\n", f)).collect();
                CommandOutput::new(Some(0), stdout, "")
            }
            None => CommandOutput::new(
                Some(1),
                "",
                format!("bash: line 1: cd: {}: No such file or directory\n", root),
            ),
        }
    }
}

#[async_trait]
impl RemoteExecutor for FakeCluster {
    async fn exec(&self, host: &str, program: &str, args: &[String]) -> Result<CommandOutput> {
        self.calls.lock().unwrap().push(Call {
            host: host.to_string(),
            program: program.to_string(),
            args: args.to_vec(),
        });

        let output = match program {
            "sbatch" => {
                let mut next = self.next_job.lock().unwrap();
                let id = *next;
                *next += 1;
                CommandOutput::new(Some(0), format!("Submitted batch job {}\n", id), "")
            }
            "squeue" => {
                let state = self.queue_states.lock().unwrap().pop_front().unwrap_or_default();
                CommandOutput::new(Some(0), format!("{}\n", state), "")
            }
            "sacct" => {
                let state = self.accounting_state.lock().unwrap().clone();
                CommandOutput::new(Some(0), format!("{}\n", state), "")
            }
            "bash" => {
                let script = args.get(1).cloned().unwrap_or_default();
                if script.contains("git rev-parse") {
                    CommandOutput::new(Some(128), "", "fatal: not a git repository\n")
                } else {
                    self.listing(&script)
                }
            }
            other => CommandOutput::new(Some(127), "", format!("{}: command not found\n", other)),
        };
        Ok(output)
    }

    fn name(&self) -> &'static str {
        "fake-cluster"
    }
}

/// What a pull would have written to rsync's stdin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedPull {
    pub host: String,
    pub root: String,
    pub dest: String,
    pub manifest: String,
}

/// Copy tool that only records what it was asked to do
#[derive(Default)]
pub struct RecordingCopier {
    pulls: Mutex<Vec<RecordedPull>>,
    fail_root: Mutex<Option<String>>,
}

impl RecordingCopier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make pulls from `root` exit with code 23
    pub fn failing_for(self, root: &str) -> Self {
        *self.fail_root.lock().unwrap() = Some(root.to_string());
        self
    }

    pub fn pulls(&self) -> Vec<RecordedPull> {
        self.pulls.lock().unwrap().clone()
    }
}

#[async_trait]
impl FileTransfer for RecordingCopier {
    async fn pull(&self, request: &PullRequest) -> Result<()> {
        self.pulls.lock().unwrap().push(RecordedPull {
            host: request.host.clone(),
            root: request.root.clone(),
            dest: request.dest.display().to_string(),
            manifest: manifest(&request.files),
        });
        if self.fail_root.lock().unwrap().as_deref() == Some(request.root.as_str()) {
            return Err(RemoteError::TransferFailed {
                source_spec: format!("{}:{}/", request.host, request.root),
                exit_code: Some(23),
            }
            .into());
        }
        Ok(())
    }

    async fn push(&self, _host: &str, _local: &Path, _remote_path: &str) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording-copier"
    }
}
