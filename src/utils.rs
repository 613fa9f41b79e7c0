//! Utility functions for shell quoting and local path handling

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Quote a single argument for a POSIX shell
///
/// Arguments made only of safe characters are returned unchanged; anything
/// else is wrapped in single quotes with embedded quotes escaped as `'\''`.
///
/// # Examples
///
/// ```
/// use exp_tracker::utils::shell_quote;
///
/// assert_eq!(shell_quote("/data/out"), "/data/out");
/// assert_eq!(shell_quote("it's"), r"'it'\''s'");
/// assert_eq!(shell_quote(""), "''");
/// ```
pub fn shell_quote(arg: &str) -> String {
    if !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@%+,".contains(c))
    {
        return arg.to_string();
    }
    format!("'{}'", arg.replace('\'', r"'\''"))
}

/// Always single-quote, even for safe strings
pub fn single_quote(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', r"'\''"))
}

/// Join arguments into one shell command line, quoting each
pub fn shell_join<S: AsRef<str>>(args: &[S]) -> String {
    args.iter()
        .map(|a| shell_quote(a.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Expand a leading `~` to the home directory and make the path absolute
///
/// Relative paths are resolved against the current directory. `~user` forms
/// are not expanded.
pub fn expand_local_path(path: &str) -> PathBuf {
    let trimmed = path.trim();
    let expanded = match (trimmed.strip_prefix('~'), dirs::home_dir()) {
        (Some(""), Some(home)) => home,
        (Some(rest), Some(home)) if rest.starts_with('/') => home.join(rest.trim_start_matches('/')),
        _ => PathBuf::from(trimmed),
    };
    std::path::absolute(&expanded).unwrap_or(expanded)
}

/// Check that a local file exists and is not a directory
pub fn require_local_file(path: &Path) -> Result<()> {
    let meta = std::fs::metadata(path).map_err(|e| Error::InvalidPath {
        path: path.to_path_buf(),
        reason: format!("cannot access local file: {}", e),
    })?;
    if meta.is_dir() {
        return Err(Error::InvalidPath {
            path: path.to_path_buf(),
            reason: "expected a file, found a directory".to_string(),
        });
    }
    Ok(())
}
