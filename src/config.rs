//! Configuration types and layered run-parameter resolution for exp-tracker
//!
//! Run parameters come from up to five places. For every setting the first
//! layer that supplies it wins:
//!
//! 1. command-line flags
//! 2. the per-run file given with `--config-file`
//! 3. the named profile from the global config
//! 4. the `defaults` profile from the global config
//! 5. built-in defaults (since-start filter on, 30s poll interval)
//!
//! The global config lives in `~/.exp/config.{yaml,yml,json}`.

use crate::artifacts::PatternFilter;
use crate::artifacts::sources::{
    combine_patterns, flatten_patterns, normalize_patterns, normalize_sources, validate_source_path,
};
use crate::error::{Error, Result};
use crate::types::ArtifactSource;
use crate::utils::expand_local_path;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable consulted when no layer names a remote host
pub const REMOTE_ENV_VAR: &str = "EXP_REMOTE";

/// Poll interval used when no layer sets one
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Global config file names, in lookup order
pub const CONFIG_FILE_NAMES: &[&str] = &["config.yaml", "config.yml", "config.json"];

/// Reusable set of run settings (the `defaults` block or a named profile)
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunProfile {
    /// Remote host (user@host)
    pub remote: Option<String>,
    /// Remote directory for sbatch logs
    pub log_dir: Option<String>,
    /// Remote batch script path
    pub script: Option<String>,
    /// Local script run on the remote host before submission
    pub build_script: Option<String>,
    /// Explicit artifact sources
    pub artifact_sources: Vec<ArtifactSource>,
    /// Patterns for the legacy single source
    pub artifact_patterns: Vec<String>,
    /// Single pattern, appended after `artifact_patterns`
    pub artifact_pattern: Option<String>,
    /// Legacy single remote artifact directory
    pub artifact_remote: Option<String>,
    /// Local base directory for artifacts
    pub artifact_dest: Option<String>,
    /// Only fetch files modified after submission
    pub artifact_since_start: Option<bool>,
    /// Poll interval as a duration string (`30s`, `2m`, `1h30m`)
    pub poll_interval: Option<String>,
}

/// Global configuration file (`~/.exp/config.yaml`)
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    /// Settings applied to every run
    pub defaults: RunProfile,
    /// Named profiles selected with `--profile`
    pub profiles: HashMap<String, RunProfile>,
    /// Where the file was loaded from
    #[serde(skip)]
    pub path: PathBuf,
}

/// Per-run file given with `--config-file`
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct RunConfigFile {
    /// Profile to apply when `--profile` is not given
    pub profile: Option<String>,
    /// Experiment name
    pub name: Option<String>,
    /// Local batch script to upload to `script`
    pub script_local: Option<String>,
    /// Script arguments, used when none follow `--`
    pub args: Vec<String>,
    /// The profile-shaped settings
    #[serde(flatten)]
    pub run: RunProfile,
}

/// Settings given on the command line
#[derive(Clone, Debug, Default)]
pub struct RunOverrides {
    /// `--remote`
    pub remote: Option<String>,
    /// `--name`
    pub name: Option<String>,
    /// `--log-dir`
    pub log_dir: Option<String>,
    /// `--script`
    pub script: Option<String>,
    /// `--build-script`
    pub build_script: Option<String>,
    /// `--script-local`
    pub script_local: Option<String>,
    /// `--artifact-remote`
    pub artifact_remote: Option<String>,
    /// `--artifact-dest`
    pub artifact_dest: Option<String>,
    /// `--artifact-pattern`, repeatable
    pub artifact_patterns: Vec<String>,
    /// `--artifact-since-start`
    pub artifact_since_start: Option<bool>,
    /// `--poll-interval`
    pub poll_interval: Option<String>,
    /// `--config-file`
    pub config_file: Option<PathBuf>,
    /// `--profile`
    pub profile: Option<String>,
    /// Arguments after `--`
    pub args: Vec<String>,
}

/// One source of run settings, every field optional
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunLayer {
    /// Where the values came from, for error messages
    pub origin: String,
    /// Experiment name
    pub name: Option<String>,
    /// Remote host
    pub remote: Option<String>,
    /// Remote log directory
    pub log_dir: Option<String>,
    /// Remote script path
    pub script: Option<String>,
    /// Local build script
    pub build_script: Option<String>,
    /// Local script to upload
    pub script_local: Option<String>,
    /// Legacy remote artifact directory
    pub artifact_remote: Option<String>,
    /// Local artifact base directory
    pub artifact_dest: Option<String>,
    /// Explicit sources
    pub artifact_sources: Option<Vec<ArtifactSource>>,
    /// Patterns for the legacy source
    pub artifact_patterns: Option<Vec<String>>,
    /// Since-start filter
    pub artifact_since_start: Option<bool>,
    /// Parsed poll interval
    pub poll_interval: Option<Duration>,
    /// Script arguments
    pub args: Option<Vec<String>>,
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn non_empty_vec<T: Clone>(values: &[T]) -> Option<Vec<T>> {
    (!values.is_empty()).then(|| values.to_vec())
}

fn parse_poll_interval(raw: &Option<String>, origin: &str) -> Result<Option<Duration>> {
    let Some(raw) = non_empty(raw) else {
        return Ok(None);
    };
    match parse_duration(&raw) {
        Some(d) if !d.is_zero() => Ok(Some(d)),
        Some(_) => Err(Error::config(
            format!("poll_interval in {} must be positive, got {:?}", origin, raw),
            "poll_interval",
        )),
        None => Err(Error::config(
            format!("invalid poll_interval {:?} in {}", raw, origin),
            "poll_interval",
        )),
    }
}

impl RunLayer {
    /// Layer built from a profile block
    pub fn from_profile(profile: &RunProfile, origin: impl Into<String>) -> Result<Self> {
        let origin = origin.into();
        let mut patterns = normalize_patterns(&profile.artifact_patterns);
        if let Some(single) = non_empty(&profile.artifact_pattern) {
            patterns.push(single);
        }
        Ok(Self {
            poll_interval: parse_poll_interval(&profile.poll_interval, &origin)?,
            origin,
            name: None,
            remote: non_empty(&profile.remote),
            log_dir: non_empty(&profile.log_dir),
            script: non_empty(&profile.script),
            build_script: non_empty(&profile.build_script),
            script_local: None,
            artifact_remote: non_empty(&profile.artifact_remote),
            artifact_dest: non_empty(&profile.artifact_dest),
            artifact_sources: non_empty_vec(&profile.artifact_sources),
            artifact_patterns: non_empty_vec(&patterns),
            artifact_since_start: profile.artifact_since_start,
            args: None,
        })
    }

    /// Layer built from a per-run file
    pub fn from_run_file(file: &RunConfigFile, origin: impl Into<String>) -> Result<Self> {
        let mut layer = Self::from_profile(&file.run, origin)?;
        layer.name = non_empty(&file.name);
        layer.script_local = non_empty(&file.script_local);
        layer.args = non_empty_vec(&file.args);
        Ok(layer)
    }

    /// Layer built from command-line flags
    pub fn from_overrides(overrides: &RunOverrides) -> Result<Self> {
        let origin = "command-line flags".to_string();
        Ok(Self {
            poll_interval: parse_poll_interval(&overrides.poll_interval, &origin)?,
            origin,
            name: non_empty(&overrides.name),
            remote: non_empty(&overrides.remote),
            log_dir: non_empty(&overrides.log_dir),
            script: non_empty(&overrides.script),
            build_script: non_empty(&overrides.build_script),
            script_local: non_empty(&overrides.script_local),
            artifact_remote: non_empty(&overrides.artifact_remote),
            artifact_dest: non_empty(&overrides.artifact_dest),
            artifact_sources: None,
            artifact_patterns: non_empty_vec(&normalize_patterns(&overrides.artifact_patterns)),
            artifact_since_start: overrides.artifact_since_start,
            args: non_empty_vec(&overrides.args),
        })
    }

    /// Merge layers in priority order; the first layer with a value wins
    pub fn merge(layers: &[RunLayer]) -> RunLayer {
        fn first<T: Clone>(layers: &[RunLayer], field: impl Fn(&RunLayer) -> &Option<T>) -> Option<T> {
            layers.iter().find_map(|l| field(l).clone())
        }

        RunLayer {
            origin: "merged".to_string(),
            name: first(layers, |l| &l.name),
            remote: first(layers, |l| &l.remote),
            log_dir: first(layers, |l| &l.log_dir),
            script: first(layers, |l| &l.script),
            build_script: first(layers, |l| &l.build_script),
            script_local: first(layers, |l| &l.script_local),
            artifact_remote: first(layers, |l| &l.artifact_remote),
            artifact_dest: first(layers, |l| &l.artifact_dest),
            artifact_sources: first(layers, |l| &l.artifact_sources),
            artifact_patterns: first(layers, |l| &l.artifact_patterns),
            artifact_since_start: first(layers, |l| &l.artifact_since_start),
            poll_interval: first(layers, |l| &l.poll_interval),
            args: first(layers, |l| &l.args),
        }
    }
}

/// Fully resolved and validated parameters of one run
#[derive(Clone, Debug, PartialEq)]
pub struct RunParams {
    /// Experiment name
    pub name: String,
    /// Remote host
    pub remote: String,
    /// Remote log directory
    pub log_dir: String,
    /// Remote batch script path
    pub script: String,
    /// Local build script, absolute
    pub build_script: Option<PathBuf>,
    /// Local script to upload, absolute
    pub script_local: Option<PathBuf>,
    /// Legacy remote artifact directory as configured
    pub artifact_remote: Option<String>,
    /// Local artifact base directory, absolute; the experiment id is appended later
    pub artifact_dest: Option<PathBuf>,
    /// Sources in transfer order (explicit, or synthesized from `artifact_remote`)
    pub artifact_sources: Vec<ArtifactSource>,
    /// Patterns of the legacy source
    pub artifact_patterns: Vec<String>,
    /// Persisted combined pattern string
    pub artifact_pattern: String,
    /// Since-start filter
    pub artifact_since_start: bool,
    /// Poll interval
    pub poll_interval: Duration,
    /// Script arguments
    pub args: Vec<String>,
    /// Per-run file used, absolute
    pub config_file: Option<PathBuf>,
    /// Profile applied
    pub profile: Option<String>,
}

/// JSON record of the resolved parameters, stored with the experiment
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSnapshot {
    /// Experiment name
    pub name: String,
    /// Remote host
    pub remote: String,
    /// Remote log directory
    pub log_dir: String,
    /// Remote script path
    pub script: String,
    /// Local build script
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_script: Option<String>,
    /// Legacy remote artifact directory
    #[serde(default)]
    pub artifact_remote: String,
    /// Per-experiment artifact destination
    #[serde(default)]
    pub artifact_dest: String,
    /// Patterns of the legacy source
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifact_patterns: Vec<String>,
    /// Explicit sources
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifact_sources: Vec<ArtifactSource>,
    /// Combined pattern string
    #[serde(default)]
    pub artifact_pattern: String,
    /// Since-start filter
    pub artifact_since_start: bool,
    /// Poll interval as a duration string
    pub poll_interval: String,
    /// Script arguments
    #[serde(default)]
    pub args: Vec<String>,
    /// Per-run file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_file: Option<String>,
    /// Profile
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    /// Commit recorded at submission
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_commit: Option<String>,
    /// Branch recorded at submission
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_branch: Option<String>,
}

impl RunParams {
    /// Validate merged layers into run parameters
    ///
    /// `env_remote` is the value of [`REMOTE_ENV_VAR`], used only when no
    /// layer names a host.
    pub fn from_layers(
        layers: &[RunLayer],
        env_remote: Option<&str>,
        config_file: Option<PathBuf>,
        profile: Option<String>,
    ) -> Result<Self> {
        let merged = RunLayer::merge(layers);

        let remote = merged.remote.clone().or_else(|| {
            env_remote
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        });

        let missing: Vec<&str> = [
            ("remote", remote.is_none()),
            ("name", merged.name.is_none()),
            ("log-dir", merged.log_dir.is_none()),
            ("script", merged.script.is_none()),
        ]
        .iter()
        .filter(|(_, absent)| *absent)
        .map(|(key, _)| *key)
        .collect();
        if !missing.is_empty() {
            return Err(Error::config_general(format!(
                "missing required setting(s): {} (remote, name, log-dir and script are required; \
                 the remote may also come from {})",
                missing.join(", "),
                REMOTE_ENV_VAR
            )));
        }

        let artifact_remote = merged
            .artifact_remote
            .as_deref()
            .map(|p| validate_source_path(p, "artifact_remote"))
            .transpose()?;
        let explicit_sources = merged.artifact_sources.clone().unwrap_or_default();

        if explicit_sources.is_empty() && artifact_remote.is_some() != merged.artifact_dest.is_some() {
            return Err(Error::config(
                "artifact_remote and artifact_dest must be provided together (or specify artifact_sources)",
                "artifact_dest",
            ));
        }

        let artifact_patterns = merged.artifact_patterns.clone().unwrap_or_default();
        let artifact_sources = if !explicit_sources.is_empty() {
            normalize_sources(&explicit_sources, "artifact_sources")?
        } else if let Some(path) = &artifact_remote {
            vec![ArtifactSource::new(path.clone(), artifact_patterns.clone())]
        } else {
            Vec::new()
        };

        let artifact_dest = merged.artifact_dest.as_deref().map(expand_local_path);
        if artifact_dest.is_some() && artifact_sources.is_empty() {
            return Err(Error::config(
                "artifact sources are required when artifact_dest is set",
                "artifact_sources",
            ));
        }

        PatternFilter::compile(&artifact_patterns)?;
        for source in &artifact_sources {
            PatternFilter::compile(&source.patterns)?;
        }

        let mut artifact_pattern = combine_patterns(&flatten_patterns(&artifact_sources));
        if artifact_pattern.is_empty() {
            artifact_pattern = combine_patterns(&artifact_patterns);
        }

        let (Some(remote), Some(name), Some(log_dir), Some(script)) =
            (remote, merged.name, merged.log_dir, merged.script)
        else {
            return Err(Error::config_general("missing required settings"));
        };

        Ok(Self {
            name,
            remote,
            log_dir,
            script,
            build_script: merged.build_script.as_deref().map(expand_local_path),
            script_local: merged.script_local.as_deref().map(expand_local_path),
            artifact_remote,
            artifact_dest,
            artifact_sources,
            artifact_patterns,
            artifact_pattern,
            artifact_since_start: merged.artifact_since_start.unwrap_or(true),
            poll_interval: merged.poll_interval.unwrap_or(DEFAULT_POLL_INTERVAL),
            args: merged.args.unwrap_or_default(),
            config_file,
            profile,
        })
    }

    /// Path recorded as the experiment's primary artifact path
    pub fn primary_artifact_path(&self) -> Option<&str> {
        self.artifact_sources
            .first()
            .map(|s| s.path.as_str())
            .or(self.artifact_remote.as_deref())
    }

    /// Snapshot for the store, with the final destination and git metadata
    pub fn snapshot(
        &self,
        artifact_dest: Option<&Path>,
        git_commit: Option<&str>,
        git_branch: Option<&str>,
    ) -> RunSnapshot {
        RunSnapshot {
            name: self.name.clone(),
            remote: self.remote.clone(),
            log_dir: self.log_dir.clone(),
            script: self.script.clone(),
            build_script: self.build_script.as_ref().map(|p| p.display().to_string()),
            artifact_remote: self.artifact_remote.clone().unwrap_or_default(),
            artifact_dest: artifact_dest.map(|p| p.display().to_string()).unwrap_or_default(),
            artifact_patterns: self.artifact_patterns.clone(),
            artifact_sources: self.artifact_sources.clone(),
            artifact_pattern: self.artifact_pattern.clone(),
            artifact_since_start: self.artifact_since_start,
            poll_interval: format_duration(self.poll_interval),
            args: self.args.clone(),
            config_file: self.config_file.as_ref().map(|p| p.display().to_string()),
            profile: self.profile.clone(),
            git_commit: git_commit.map(str::to_string),
            git_branch: git_branch.map(str::to_string),
        }
    }
}

/// Resolve run parameters from flags, files and profiles
///
/// `config_dir` holds the global config (normally `~/.exp`). Profile errors
/// and every validation failure are reported before any remote I/O.
pub fn resolve_run_params(
    overrides: &RunOverrides,
    config_dir: &Path,
    env_remote: Option<&str>,
) -> Result<RunParams> {
    let mut layers = vec![RunLayer::from_overrides(overrides)?];

    let mut config_file = None;
    let mut profile_name = non_empty(&overrides.profile);
    if let Some(path) = &overrides.config_file {
        let path = expand_local_path(&path.to_string_lossy());
        let run_file = load_run_config_file(&path)?;
        layers.push(RunLayer::from_run_file(
            &run_file,
            format!("config file {}", path.display()),
        )?);
        if profile_name.is_none() {
            profile_name = non_empty(&run_file.profile);
        }
        config_file = Some(path);
    }

    match (load_config_file(config_dir)?, &profile_name) {
        (None, Some(name)) => {
            return Err(Error::config(
                format!(
                    "profile {:?} requested but no config file found (expected {}/config.(yaml|yml|json))",
                    name,
                    config_dir.display()
                ),
                "profile",
            ));
        }
        (None, None) => {}
        (Some(global), profile) => {
            if let Some(name) = profile {
                let selected = global.profiles.get(name).ok_or_else(|| {
                    Error::config(
                        format!("profile {:?} not found in {}", name, global.path.display()),
                        "profile",
                    )
                })?;
                layers.push(RunLayer::from_profile(selected, format!("profile {}", name))?);
            }
            layers.push(RunLayer::from_profile(&global.defaults, "defaults")?);
        }
    }

    let params = RunParams::from_layers(&layers, env_remote, config_file, profile_name)?;
    tracing::debug!(
        name = %params.name,
        remote = %params.remote,
        layers = layers.len(),
        "Resolved run parameters"
    );
    Ok(params)
}

/// `~/.exp`, created if missing
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| Error::config_general("cannot determine the home directory"))?;
    let dir = home.join(".exp");
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Path of the experiment store inside `config_dir`
pub fn db_path(config_dir: &Path) -> PathBuf {
    config_dir.join("experiments.db")
}

/// Load the first existing global config file in `dir`
///
/// Returns `None` when there is none. An empty file is an empty config.
pub fn load_config_file(dir: &Path) -> Result<Option<ConfigFile>> {
    for name in CONFIG_FILE_NAMES {
        let path = dir.join(name);
        let data = match std::fs::read_to_string(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        };

        let mut config = if data.trim().is_empty() {
            ConfigFile::default()
        } else {
            parse_config_data::<ConfigFile>(&data, &path).map_err(|e| {
                Error::config(
                    format!("failed to parse {}: {}", path.display(), e),
                    "config",
                )
            })?
        };
        config.path = path;
        return Ok(Some(config));
    }
    Ok(None)
}

/// Load a per-run config file
pub fn load_run_config_file(path: &Path) -> Result<RunConfigFile> {
    let data = std::fs::read_to_string(path).map_err(|e| Error::InvalidPath {
        path: path.to_path_buf(),
        reason: format!("cannot read config file: {}", e),
    })?;
    if data.trim().is_empty() {
        return Ok(RunConfigFile::default());
    }
    parse_config_data(&data, path).map_err(|e| {
        Error::config(
            format!("failed to parse {}: {}", path.display(), e),
            "config_file",
        )
    })
}

/// Parse JSON or YAML, choosing by extension
///
/// `.yaml`/`.yml` parse as YAML. Anything else tries JSON first and falls
/// back to YAML; if both fail the JSON error is reported for `.json` files
/// and the YAML error otherwise.
pub fn parse_config_data<T: DeserializeOwned>(data: &str, path: &Path) -> Result<T> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    if ext == "yaml" || ext == "yml" {
        return Ok(serde_yaml::from_str(data)?);
    }

    match serde_json::from_str(data) {
        Ok(value) => Ok(value),
        Err(json_err) => match serde_yaml::from_str(data) {
            Ok(value) => Ok(value),
            Err(_) if ext == "json" => Err(json_err.into()),
            Err(yaml_err) => Err(yaml_err.into()),
        },
    }
}

/// Parse a duration string such as `30s`, `2m`, `1h30m`, `1.5h` or `500ms`
///
/// Units: `ns`, `us`/`µs`, `ms`, `s`, `m`, `h`. A bare `0` is accepted.
/// Negative durations are rejected.
pub fn parse_duration(input: &str) -> Option<Duration> {
    let s = input.trim();
    let s = s.strip_prefix('+').unwrap_or(s);
    if s == "0" {
        return Some(Duration::ZERO);
    }
    if s.is_empty() || s.starts_with('-') {
        return None;
    }

    let mut total = 0f64;
    let mut rest = s;
    while !rest.is_empty() {
        let num_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if num_len == 0 {
            return None;
        }
        let value: f64 = rest[..num_len].parse().ok()?;
        rest = &rest[num_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let nanos_per_unit = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return None,
        };
        rest = &rest[unit_len..];
        total += value * nanos_per_unit;
    }

    if !total.is_finite() || total > u64::MAX as f64 {
        return None;
    }
    Some(Duration::from_nanos(total.round() as u64))
}

/// Render a duration the way [`parse_duration`] reads it (`1h30m0s`, `45s`, `500ms`)
pub fn format_duration(d: Duration) -> String {
    if d.is_zero() {
        return "0s".to_string();
    }
    if d < Duration::from_secs(1) {
        let nanos = d.subsec_nanos();
        return if nanos % 1_000_000 == 0 {
            format!("{}ms", nanos / 1_000_000)
        } else if nanos % 1_000 == 0 {
            format!("{}µs", nanos / 1_000)
        } else {
            format!("{}ns", nanos)
        };
    }

    let total = d.as_secs();
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    let frac = d.subsec_nanos();
    let secs = if frac == 0 {
        format!("{}s", s)
    } else {
        let digits = format!("{:09}", frac);
        format!("{}.{}s", s, digits.trim_end_matches('0'))
    };

    match (h, m) {
        (0, 0) => secs,
        (0, m) => format!("{}m{}", m, secs),
        (h, m) => format!("{}h{}m{}", h, m, secs),
    }
}
