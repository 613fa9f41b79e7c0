//! Error types for exp-tracker
//!
//! This module provides the error taxonomy for the crate:
//! - Configuration errors (missing parameters, malformed filters, relative remote paths)
//! - Remote errors (submission, listing, transfer and other command failures)
//! - Persistence errors from the SQLite experiment store
//! - Process exit code mapping for the `exp` binary

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for exp-tracker operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for exp-tracker
///
/// Each variant carries enough context (host, command, path, pattern) for the
/// CLI to print a single descriptive message.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "artifact_remote")
        key: Option<String>,
    },

    /// An artifact filter expression failed to compile
    #[error("invalid artifact pattern {pattern:?}: {reason}")]
    InvalidPattern {
        /// The pattern as written by the user
        pattern: String,
        /// Compiler diagnostic
        reason: String,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// A command on the remote host or a transfer failed
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// External tool could not be started (ssh, rsync, scp, git)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Experiment not found in the local store
    #[error("no experiment with id {0}")]
    NotFound(i64),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Local file could not be used (missing, directory, unreadable)
    #[error("{path}: {reason}")]
    InvalidPath {
        /// The offending local path
        path: PathBuf,
        /// Why the path was rejected
        reason: String,
    },

    /// JSON serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML config parse error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Monitoring or discovery was cancelled before it finished
    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    /// Build a [`Error::Config`] for a specific configuration key
    pub fn config(message: impl Into<String>, key: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Build a [`Error::Config`] that is not tied to a single key
    pub fn config_general(message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: None,
        }
    }

    /// Machine-readable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::InvalidPattern { .. } => "invalid_pattern",
            Error::Database(_) | Error::Sqlx(_) => "database_error",
            Error::Remote(e) => match e {
                RemoteError::CommandFailed { .. } => "remote_command_failed",
                RemoteError::SubmissionFailed { .. } => "submission_failed",
                RemoteError::UnparseableSubmission { .. } => "unparseable_submission",
                RemoteError::TransferFailed { .. } | RemoteError::ManifestWriteFailed { .. } => "transfer_failed",
            },
            Error::ExternalTool(_) => "external_tool_error",
            Error::NotFound(_) => "not_found",
            Error::Io(_) => "io_error",
            Error::InvalidPath { .. } => "invalid_path",
            Error::Serialization(_) => "serialization_error",
            Error::Yaml(_) => "yaml_error",
            Error::Cancelled => "cancelled",
        }
    }

    /// Process exit code for the `exp` binary
    ///
    /// Configuration problems exit with 2, remote/transfer failures with 3,
    /// cancellation with 130, everything else with 1.
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::Config { .. } | Error::InvalidPattern { .. } | Error::InvalidPath { .. } => 2,
            Error::Remote(_) | Error::ExternalTool(_) => 3,
            Error::Cancelled => 130,
            Error::Database(_)
            | Error::Sqlx(_)
            | Error::NotFound(_)
            | Error::Io(_)
            | Error::Serialization(_)
            | Error::Yaml(_) => 1,
        }
    }
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// A stored row could not be decoded into a domain value
    #[error("corrupt record {id}: {reason}")]
    CorruptRecord {
        /// Row id
        id: i64,
        /// What failed to decode
        reason: String,
    },
}

/// Failures of commands run on (or transfers from) the remote host
#[derive(Debug, Error)]
pub enum RemoteError {
    /// A remote command exited non-zero
    #[error("{command} on {host} failed (exit {}): {stderr}", display_exit(*.exit_code))]
    CommandFailed {
        /// Remote host (user@host)
        host: String,
        /// The command line that was run
        command: String,
        /// Exit code, `None` when killed by a signal
        exit_code: Option<i32>,
        /// Captured error stream, trimmed
        stderr: String,
    },

    /// `sbatch` exited non-zero
    #[error("sbatch on {host} failed (exit {}): {output}", display_exit(*.exit_code))]
    SubmissionFailed {
        /// Remote host
        host: String,
        /// Exit code of the submission
        exit_code: Option<i32>,
        /// Combined submission output
        output: String,
    },

    /// `sbatch` succeeded but printed nothing to take a job id from
    #[error("unable to parse sbatch output from {host}: {output:?}")]
    UnparseableSubmission {
        /// Remote host
        host: String,
        /// Combined submission output
        output: String,
    },

    /// The bulk-copy utility exited non-zero
    #[error("rsync from {source_spec} failed (exit {})", display_exit(*.exit_code))]
    TransferFailed {
        /// `host:root/` source specification
        source_spec: String,
        /// Exit code of the copy utility
        exit_code: Option<i32>,
    },

    /// The manifest could not be streamed to rsync, which still exited 0
    #[error("writing file list to rsync for {source_spec} failed: {source}")]
    ManifestWriteFailed {
        /// `host:root/` source specification
        source_spec: String,
        /// Underlying pipe error
        source: std::io::Error,
    },
}

fn display_exit(code: Option<i32>) -> String {
    code.map_or_else(|| "signal".to_string(), |c| c.to_string())
}
