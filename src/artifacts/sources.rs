//! Artifact source and pattern list normalization

use crate::error::{Error, Result};
use crate::types::ArtifactSource;

/// Trim patterns and drop empty ones, keeping order
pub fn normalize_patterns<S: AsRef<str>>(patterns: &[S]) -> Vec<String> {
    patterns
        .iter()
        .map(|p| p.as_ref().trim())
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Persisted form of a pattern list: one pattern per line
pub fn combine_patterns<S: AsRef<str>>(patterns: &[S]) -> String {
    normalize_patterns(patterns).join("\n")
}

/// Inverse of [`combine_patterns`]
pub fn split_patterns(combined: &str) -> Vec<String> {
    normalize_patterns(&combined.lines().collect::<Vec<_>>())
}

/// Every pattern of every source, in source order
pub fn flatten_patterns(sources: &[ArtifactSource]) -> Vec<String> {
    sources
        .iter()
        .flat_map(|s| normalize_patterns(&s.patterns))
        .collect()
}

/// Check that a remote artifact path is present and absolute
///
/// Returns the trimmed path. `key` names the setting in the error message.
pub fn validate_source_path(path: &str, key: &str) -> Result<String> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err(Error::config(format!("{} must not be empty", key), key));
    }
    if !trimmed.starts_with('/') {
        return Err(Error::config(
            format!(
                "{} must be an absolute path on the remote host, got {:?}",
                key, trimmed
            ),
            key,
        ));
    }
    Ok(trimmed.to_string())
}

/// Validate every source path and normalize every pattern list
pub fn normalize_sources(sources: &[ArtifactSource], key: &str) -> Result<Vec<ArtifactSource>> {
    sources
        .iter()
        .map(|s| {
            Ok(ArtifactSource {
                path: validate_source_path(&s.path, key)?,
                patterns: normalize_patterns(&s.patterns),
            })
        })
        .collect()
}

/// Join a relative path onto a remote root the way the listing reports it
pub fn join_remote(root: &str, rel: &str) -> String {
    let base = root.trim_end_matches('/');
    format!("{}/{}", base, rel.trim_start_matches('/'))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_patterns() {
        assert_eq!(
            normalize_patterns(&["  a ", "", "   ", "b"]),
            vec!["a".to_string(), "b".to_string()]
        );
    }

    #[test]
    fn test_combine_and_split() {
        let combined = combine_patterns(&[r"\.json$", " ", r"^ckpt/"]);
        assert_eq!(combined, "\\.json$\n^ckpt/");
        assert_eq!(split_patterns(&combined), vec![r"\.json$", r"^ckpt/"]);
        assert!(split_patterns("").is_empty());
        assert!(split_patterns("\n  \n").is_empty());
    }

    #[test]
    fn test_flatten_patterns() {
        let sources = vec![
            ArtifactSource::new("/a", vec!["x".into()]),
            ArtifactSource::new("/b", vec![]),
            ArtifactSource::new("/c", vec!["y".into(), " ".into()]),
        ];
        assert_eq!(flatten_patterns(&sources), vec!["x", "y"]);
    }

    #[test]
    fn test_validate_source_path() {
        assert_eq!(validate_source_path(" /data/out ", "artifact_remote").unwrap(), "/data/out");
        let err = validate_source_path("data/out", "artifact_remote").unwrap_err();
        assert!(err.to_string().contains("absolute"));
        assert!(matches!(err, Error::Config { key: Some(ref k), .. } if k == "artifact_remote"));
        assert!(validate_source_path("  ", "remote-path").is_err());
    }

    #[test]
    fn test_normalize_sources_rejects_relative() {
        let sources = vec![
            ArtifactSource::new("/ok", vec![" a ".into()]),
            ArtifactSource::new("rel", vec![]),
        ];
        assert!(normalize_sources(&sources, "artifact_sources").is_err());

        let ok = normalize_sources(&sources[..1], "artifact_sources").unwrap();
        assert_eq!(ok[0].patterns, vec!["a"]);
    }

    #[test]
    fn test_join_remote() {
        assert_eq!(join_remote("/data/out", "sub/c.json"), "/data/out/sub/c.json");
        assert_eq!(join_remote("/data/out/", "a.json"), "/data/out/a.json");
        assert_eq!(join_remote("/", "a.json"), "/a.json");
    }
}
