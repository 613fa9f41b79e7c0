//! Shared test doubles for the remote and transfer seams.

use crate::artifacts::{FileTransfer, PullRequest};
use crate::db::Database;
use crate::error::{Error, RemoteError, Result};
use crate::remote::{CommandOutput, RemoteExecutor};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Successful output with the given stdout
pub(crate) fn ok(stdout: &str) -> CommandOutput {
    CommandOutput::new(Some(0), stdout, "")
}

/// Failed output with the given exit code and stderr
pub(crate) fn fail(code: i32, stderr: &str) -> CommandOutput {
    CommandOutput::new(Some(code), "", stderr)
}

/// One call seen by [`ScriptedExecutor`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RecordedCall {
    pub host: String,
    pub program: String,
    pub args: Vec<String>,
}

type Scripted = std::result::Result<CommandOutput, String>;

/// Executor answering from per-program queues
///
/// Each program has its own queue; the last queued answer repeats once the
/// others are used up. A program with no answers fails the test loudly.
#[derive(Default)]
pub(crate) struct ScriptedExecutor {
    responses: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedExecutor {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, program: &str, output: CommandOutput) {
        self.responses
            .lock()
            .unwrap()
            .entry(program.to_string())
            .or_default()
            .push_back(Ok(output));
    }

    /// Queue a spawn failure (ssh missing, connection refused before exec)
    pub(crate) fn push_error(&self, program: &str, message: &str) {
        self.responses
            .lock()
            .unwrap()
            .entry(program.to_string())
            .or_default()
            .push_back(Err(message.to_string()));
    }

    /// Drop every queued answer for `program`
    pub(crate) fn clear(&self, program: &str) {
        self.responses.lock().unwrap().remove(program);
    }

    pub(crate) fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn calls_to(&self, program: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.program == program)
            .collect()
    }
}

#[async_trait]
impl RemoteExecutor for ScriptedExecutor {
    async fn exec(&self, host: &str, program: &str, args: &[String]) -> Result<CommandOutput> {
        self.calls.lock().unwrap().push(RecordedCall {
            host: host.to_string(),
            program: program.to_string(),
            args: args.to_vec(),
        });

        let mut responses = self.responses.lock().unwrap();
        let queue = responses
            .get_mut(program)
            .unwrap_or_else(|| panic!("no scripted response for {program}"));
        let next = if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue
                .front()
                .cloned()
                .unwrap_or_else(|| panic!("no scripted response for {program}"))
        };
        next.map_err(Error::ExternalTool)
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Transfer double that records every call and can be told to fail
#[derive(Default)]
pub(crate) struct RecordingTransfer {
    pulls: Mutex<Vec<PullRequest>>,
    pushes: Mutex<Vec<(String, PathBuf, String)>>,
    fail_pull_at: Mutex<Option<usize>>,
}

impl RecordingTransfer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Make the n-th pull (0-based) exit with code 23
    pub(crate) fn fail_pull_at(&self, index: usize) {
        *self.fail_pull_at.lock().unwrap() = Some(index);
    }

    pub(crate) fn pulls(&self) -> Vec<PullRequest> {
        self.pulls.lock().unwrap().clone()
    }

    pub(crate) fn pushes(&self) -> Vec<(String, PathBuf, String)> {
        self.pushes.lock().unwrap().clone()
    }
}

#[async_trait]
impl FileTransfer for RecordingTransfer {
    async fn pull(&self, request: &PullRequest) -> Result<()> {
        let index = {
            let mut pulls = self.pulls.lock().unwrap();
            pulls.push(request.clone());
            pulls.len() - 1
        };
        if *self.fail_pull_at.lock().unwrap() == Some(index) {
            return Err(RemoteError::TransferFailed {
                source_spec: crate::artifacts::transfer::source_spec(&request.host, &request.root),
                exit_code: Some(23),
            }
            .into());
        }
        Ok(())
    }

    async fn push(&self, host: &str, local: &Path, remote_path: &str) -> Result<()> {
        self.pushes.lock().unwrap().push((
            host.to_string(),
            local.to_path_buf(),
            remote_path.to_string(),
        ));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Fresh database in a temp dir; keep the TempDir alive for the test
pub(crate) async fn test_db() -> (Database, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::new(&dir.path().join("experiments.db")).await.unwrap();
    (db, dir)
}

/// Insert a submitted experiment without artifact settings and load it back
pub(crate) async fn insert_sample(db: &Database, name: &str) -> crate::types::Experiment {
    let new = crate::db::NewExperiment {
        name: name.to_string(),
        remote: "user@host".to_string(),
        script_path: "/a/b.sh".to_string(),
        args: Vec::new(),
        git_commit: None,
        git_branch: None,
        job_id: "4242".to_string(),
        job_status: crate::types::JobStatus::submitted(),
        log_path: format!("/logs/{}-4242.out", name),
        artifact_remote: None,
        artifact_sources: Vec::new(),
        artifact_pattern: String::new(),
        artifact_since_start: true,
    };
    let id = db.insert_experiment(&new).await.unwrap();
    db.get_experiment(id).await.unwrap().unwrap()
}
