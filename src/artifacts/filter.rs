//! Regular-expression filter over discovered artifact paths

use super::sources::join_remote;
use crate::error::{Error, Result};
use regex::Regex;

/// A compiled set of artifact patterns
///
/// A path is accepted when any expression matches the relative path, its
/// final segment, or the path joined onto the source root. An empty set
/// accepts everything.
#[derive(Debug, Clone, Default)]
pub struct PatternFilter {
    patterns: Vec<Regex>,
}

impl PatternFilter {
    /// Compile patterns, ignoring blank ones
    ///
    /// The first malformed expression is reported as
    /// [`Error::InvalidPattern`].
    pub fn compile<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| p.as_ref().trim())
            .filter(|p| !p.is_empty())
            .map(|p| {
                Regex::new(p).map_err(|e| Error::InvalidPattern {
                    pattern: p.to_string(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// Whether no patterns were given
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Test one relative path found under `root`
    pub fn matches(&self, root: &str, rel: &str) -> bool {
        if self.patterns.is_empty() {
            return true;
        }
        let base = rel.rsplit('/').next().unwrap_or(rel);
        let full = join_remote(root, rel);
        self.patterns
            .iter()
            .any(|re| re.is_match(rel) || re.is_match(base) || re.is_match(&full))
    }

    /// Keep the paths that match, preserving order
    pub fn filter(&self, root: &str, paths: &[String]) -> Vec<String> {
        paths
            .iter()
            .filter(|rel| self.matches(root, rel))
            .cloned()
            .collect()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn paths(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_empty_filter_accepts_everything() {
        let filter = PatternFilter::compile::<&str>(&[]).unwrap();
        assert!(filter.is_empty());
        let all = paths(&["a.json", "b.txt", "deep/x/y.bin"]);
        assert_eq!(filter.filter("/data/out", &all), all);
    }

    #[test]
    fn test_blank_patterns_are_ignored() {
        let filter = PatternFilter::compile(&["  ", ""]).unwrap();
        assert!(filter.is_empty());
    }

    #[test]
    fn test_json_filter() {
        let filter = PatternFilter::compile(&[r"\.json$"]).unwrap();
        let found = paths(&["a.json", "b.txt", "sub/c.json"]);
        assert_eq!(
            filter.filter("/data/out", &found),
            paths(&["a.json", "sub/c.json"])
        );
    }

    #[test]
    fn test_basename_match_is_enough() {
        // anchored on the file name, so only the final segment can match
        let filter = PatternFilter::compile(&[r"^metrics\.csv$"]).unwrap();
        assert!(filter.matches("/data/out", "run/2024/metrics.csv"));
        assert!(!filter.matches("/data/out", "run/2024/metrics.csv.bak"));
    }

    #[test]
    fn test_full_path_match() {
        let filter = PatternFilter::compile(&["^/scratch/alice/"]).unwrap();
        assert!(filter.matches("/scratch/alice/run1", "out/a.bin"));
        assert!(!filter.matches("/scratch/bob/run1", "out/a.bin"));
    }

    #[test]
    fn test_any_pattern_matches() {
        let filter = PatternFilter::compile(&[r"\.json$", r"^ckpt/"]).unwrap();
        assert!(filter.matches("/r", "ckpt/model.pt"));
        assert!(filter.matches("/r", "x.json"));
        assert!(!filter.matches("/r", "logs/train.log"));
    }

    #[test]
    fn test_malformed_pattern_is_reported() {
        let err = PatternFilter::compile(&["ok", "([a-z"]).unwrap_err();
        match err {
            Error::InvalidPattern { pattern, .. } => assert_eq!(pattern, "([a-z"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
