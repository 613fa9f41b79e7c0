//! Remote file listing with time-window filtering and retry
//!
//! Files are listed with `find` run from the source root through a login
//! shell. When a since-start cutoff applies, the time-filtered listing is
//! tried first and an unfiltered listing is the fallback; each strategy is
//! retried on an empty result under the same [`RetryPolicy`].

use super::sources::validate_source_path;
use crate::error::Result;
use crate::remote::{RemoteExecutor, run_login_shell};
use crate::retry::{RetryPolicy, retry_until};
use crate::utils::single_quote;
use chrono::{DateTime, TimeDelta, Utc};
use tokio_util::sync::CancellationToken;

/// Grace period subtracted from the experiment start for the since-start filter
pub const SINCE_START_GRACE: TimeDelta = TimeDelta::minutes(2);

/// Cutoff actually given to `find -newermt`
pub fn effective_cutoff(since: DateTime<Utc>) -> DateTime<Utc> {
    since - SINCE_START_GRACE
}

/// Shell script that lists regular files under `root`, relative to it
///
/// `cutoff` is passed through as-is; callers apply [`effective_cutoff`].
pub fn listing_command(root: &str, cutoff: Option<DateTime<Utc>>) -> String {
    let mut cmd = format!("cd {} && find . -type f", single_quote(root));
    if let Some(cutoff) = cutoff {
        cmd.push_str(" -newermt ");
        cmd.push_str(&single_quote(&format!("@{}", cutoff.timestamp())));
    }
    cmd.push_str(" -print");
    cmd
}

/// Turn `find` output into relative paths
pub fn parse_listing(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && *line != ".")
        .map(|line| line.strip_prefix("./").unwrap_or(line).to_string())
        .collect()
}

/// One way of listing a source tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingStrategy {
    /// Human-readable name for logs
    pub label: &'static str,
    /// Cutoff passed to `find`, already adjusted by the grace period
    pub cutoff: Option<DateTime<Utc>>,
    /// Attempts and pause for this strategy
    pub policy: RetryPolicy,
}

/// Ordered strategies: time-filtered first when `since` is set, then unfiltered
pub fn listing_strategies(since: Option<DateTime<Utc>>, policy: RetryPolicy) -> Vec<ListingStrategy> {
    let mut strategies = Vec::with_capacity(2);
    if let Some(since) = since {
        strategies.push(ListingStrategy {
            label: "since-start window",
            cutoff: Some(effective_cutoff(since)),
            policy,
        });
    }
    strategies.push(ListingStrategy {
        label: "without time filter",
        cutoff: None,
        policy,
    });
    strategies
}

/// Files found under one source root
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discovery {
    /// Paths relative to the root, in listing order
    pub files: Vec<String>,
    /// Listing commands run across all strategies
    pub attempts: u32,
    /// Strategy that produced the files, if any did
    pub strategy: Option<&'static str>,
}

/// List files under `root` once
///
/// A non-zero exit of the listing command is fatal and reported with the
/// host, the command and its stderr.
pub async fn list_remote_files(
    executor: &dyn RemoteExecutor,
    host: &str,
    root: &str,
    cutoff: Option<DateTime<Utc>>,
) -> Result<Vec<String>> {
    let command = listing_command(root, cutoff);
    let output = run_login_shell(executor, host, &command)
        .await?
        .check(host, &command)?;
    Ok(parse_listing(&output.stdout))
}

/// Discover files under one source root
///
/// Runs the strategies from [`listing_strategies`] in order and stops at the
/// first attempt that returns at least one file. Nothing found after every
/// attempt is an empty [`Discovery`], not an error.
pub async fn discover(
    executor: &dyn RemoteExecutor,
    host: &str,
    root: &str,
    since: Option<DateTime<Utc>>,
    policy: RetryPolicy,
    cancel: &CancellationToken,
) -> Result<Discovery> {
    let root = validate_source_path(root, "artifact source path")?;
    let mut discovery = Discovery::default();

    for strategy in listing_strategies(since, policy) {
        tracing::info!(
            host,
            root = %root,
            strategy = strategy.label,
            "Listing remote artifacts"
        );
        let outcome = retry_until(
            &strategy.policy,
            cancel,
            strategy.label,
            || list_remote_files(executor, host, &root, strategy.cutoff),
            |files: &Vec<String>| !files.is_empty(),
        )
        .await?;

        discovery.attempts += outcome.attempts;
        if outcome.accepted {
            tracing::info!(
                root = %root,
                files = outcome.value.len(),
                strategy = strategy.label,
                "Found remote artifacts"
            );
            discovery.files = outcome.value;
            discovery.strategy = Some(strategy.label);
            return Ok(discovery);
        }
    }

    tracing::warn!(host, root = %root, attempts = discovery.attempts, "Remote listing produced no files");
    Ok(discovery)
}
