//! Lifecycle and parameter fixtures

use super::{FakeCluster, RecordingCopier};
use exp_tracker::config::resolve_run_params;
use exp_tracker::{Database, Lifecycle, LifecycleTiming, RetryPolicy, RunOverrides, RunParams};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// No settle delay, no pause between listing attempts
pub fn immediate_timing() -> LifecycleTiming {
    LifecycleTiming {
        settle_delay: Duration::ZERO,
        listing: RetryPolicy::new(6, Duration::ZERO),
    }
}

/// Flags for `run1` on `user@host` with a 1ms poll interval
pub fn run1_flags() -> RunOverrides {
    RunOverrides {
        remote: Some("user@host".to_string()),
        name: Some("run1".to_string()),
        log_dir: Some("/logs".to_string()),
        script: Some("/a/b.sh".to_string()),
        poll_interval: Some("1ms".to_string()),
        ..Default::default()
    }
}

/// Resolve flags against an empty config directory
pub fn resolve(flags: &RunOverrides, config_dir: &TempDir) -> RunParams {
    resolve_run_params(flags, config_dir.path(), None).unwrap()
}

/// A lifecycle over the given stubs with a fresh store
pub async fn lifecycle(cluster: Arc<FakeCluster>, copier: Arc<RecordingCopier>) -> (Lifecycle, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::new(&dir.path().join("experiments.db")).await.unwrap();
    let lifecycle = Lifecycle::new(cluster, copier, Arc::new(db)).with_timing(immediate_timing());
    (lifecycle, dir)
}
