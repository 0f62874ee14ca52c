//! Configuration for a wikimirror run.
//!
//! Sources are layered with `figment`, lowest priority first:
//!
//! 1. `config.toml` in the user's configuration directory, when present,
//! 2. an explicitly requested TOML file,
//! 3. the JSON invocation argument supplied by the caller,
//! 4. `WIKIMIRROR_*` environment variables (`__` separates nested keys and
//!    `_` stands in for `-`, so `WIKIMIRROR_SNAPSHOT__INDEX_URL` sets
//!    `snapshot.index-url`).

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use figment::Figment;
use figment::providers::{Env, Format, Json, Toml};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_PREFIX: &str = "WIKIMIRROR_";
pub const DEFAULT_INDEX_URL: &str = "https://ftp.acc.umu.se/mirror/wikimedia.org/other/wikipedia-snapshots/";
pub const DEFAULT_INDEX_TIMEOUT_SECS: u64 = 60;
/// Name of the dump mirror directory inside the data directory.
pub const DUMPS_DIRECTORY: &str = "dumps";

/// What a run should do with the data directory. Fixed for the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// First-time initialization from a snapshot.
    Init,
    /// Incremental update of an initialized working tree.
    Update,
}
impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => f.write_str("init"),
            Self::Update => f.write_str("update"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    pub run_mode: RunMode,
    pub storage_file: StorageFile,
    #[serde(default)]
    pub snapshot: SnapshotConfig,
    #[serde(default)]
    pub dumps: DumpsConfig,
    /// Unix socket of the caller's control endpoint, for progress reports.
    #[serde(default)]
    pub control_socket: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct StorageFile {
    pub data_directory: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SnapshotConfig {
    /// Directory index listing the published snapshots.
    pub index_url: String,
    pub timeout_secs: u64,
}
impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            index_url: DEFAULT_INDEX_URL.to_string(),
            timeout_secs: DEFAULT_INDEX_TIMEOUT_SECS,
        }
    }
}
impl SnapshotConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Bulk rsync mirror of the raw dumps. Disabled unless `source` is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct DumpsConfig {
    pub source: Option<String>,
    /// Defaults to `dumps/` inside the data directory.
    pub directory: Option<PathBuf>,
}

impl Config {
    pub fn data_directory(&self) -> &Path {
        &self.storage_file.data_directory
    }

    /// Returns the rsync source and destination of the dump mirror, if enabled.
    pub fn dumps(&self) -> Option<(&str, PathBuf)> {
        let source = self.dumps.source.as_deref()?;
        let directory = self
            .dumps
            .directory
            .clone()
            .unwrap_or_else(|| self.data_directory().join(DUMPS_DIRECTORY));
        Some((source, directory))
    }

    /// Loads and validates configuration from every source.
    ///
    /// `file` is an explicitly requested TOML file (it must exist);
    /// `invocation` is the caller-supplied JSON value.
    pub fn load(file: Option<&Path>, invocation: Option<&str>) -> Result<Self> {
        Self::from_figment(figment(file, invocation)?)
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract().map_err(|e| ErrorKind::Invalid(e.to_string()))?;
        config.validate()?;
        tracing::debug!(run_mode = %config.run_mode, data_directory = %config.data_directory().display(), "Configuration loaded");
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !self.data_directory().is_absolute() {
            exn::bail!(ErrorKind::RelativeDataDirectory(self.data_directory().to_path_buf()));
        }
        if let Some(dumps) = &self.dumps.directory {
            if !dumps.is_absolute() {
                exn::bail!(ErrorKind::RelativeDumpsDirectory(dumps.clone()));
            }
            if self.data_directory().starts_with(dumps) {
                exn::bail!(ErrorKind::DumpsDirectoryOverlap(dumps.clone()));
            }
        }
        Ok(())
    }
}

/// Path of the per-user configuration file, whether or not it exists.
pub fn default_config_file() -> Option<PathBuf> {
    ProjectDirs::from("", "", "wikimirror").map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Builds the layered figment without extracting it.
pub fn figment(file: Option<&Path>, invocation: Option<&str>) -> Result<Figment> {
    let mut figment = Figment::new();
    if let Some(default) = default_config_file() {
        figment = figment.merge(Toml::file(default));
    }
    if let Some(file) = file {
        if !file.is_file() {
            exn::bail!(ErrorKind::FileNotFound(file.to_path_buf()));
        }
        figment = figment.merge(Toml::file(file));
    }
    if let Some(invocation) = invocation {
        figment = figment.merge(Json::string(invocation));
    }
    Ok(figment.merge(env()))
}

fn env() -> Env {
    Env::prefixed(ENV_PREFIX).map(|key| key.as_str().replace("__", ".").replace('_', "-").into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use rstest::rstest;

    fn from_json(json: &str) -> Result<Config> {
        Config::from_figment(Figment::from(Json::string(json)))
    }

    #[test]
    fn test_update_invocation() {
        let config = from_json(r#"{"run-mode":"update","storage-file":{"data-directory":"/data/wiki"}}"#).unwrap();
        assert_eq!(config.run_mode, RunMode::Update);
        assert_eq!(config.data_directory(), Path::new("/data/wiki"));
        assert_eq!(config.snapshot, SnapshotConfig::default());
        assert_eq!(config.dumps(), None);
        assert_eq!(config.control_socket, None);
    }

    #[test]
    fn test_full_invocation() {
        let config = from_json(
            r#"{
                "run-mode": "init",
                "storage-file": {"data-directory": "/data/wiki"},
                "snapshot": {"index-url": "https://mirror.example.org/wikipedia/", "timeout-secs": 5},
                "dumps": {"source": "rsync://mirror.example.org/dumps"},
                "control-socket": "/run/mirrors/api.sock"
            }"#,
        )
        .unwrap();
        assert_eq!(config.run_mode, RunMode::Init);
        assert_eq!(config.snapshot.index_url, "https://mirror.example.org/wikipedia/");
        assert_eq!(config.snapshot.timeout(), Duration::from_secs(5));
        assert_eq!(
            config.dumps(),
            Some(("rsync://mirror.example.org/dumps", PathBuf::from("/data/wiki/dumps")))
        );
        assert_eq!(config.control_socket, Some(PathBuf::from("/run/mirrors/api.sock")));
    }

    #[rstest]
    #[case::unknown_mode(r#"{"run-mode":"refresh","storage-file":{"data-directory":"/data/wiki"}}"#)]
    #[case::uppercase_mode(r#"{"run-mode":"INIT","storage-file":{"data-directory":"/data/wiki"}}"#)]
    #[case::missing_mode(r#"{"storage-file":{"data-directory":"/data/wiki"}}"#)]
    #[case::missing_storage(r#"{"run-mode":"init"}"#)]
    #[case::missing_directory(r#"{"run-mode":"init","storage-file":{}}"#)]
    fn test_invalid_invocation(#[case] json: &str) {
        let err = from_json(json).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Invalid(_)));
    }

    #[test]
    fn test_relative_data_directory() {
        let err = from_json(r#"{"run-mode":"init","storage-file":{"data-directory":"data/wiki"}}"#).unwrap_err();
        assert!(matches!(&*err, ErrorKind::RelativeDataDirectory(_)));
    }

    #[rstest]
    #[case::relative("dumps", |e: &ErrorKind| matches!(e, ErrorKind::RelativeDumpsDirectory(_)))]
    #[case::same("/data/wiki", |e: &ErrorKind| matches!(e, ErrorKind::DumpsDirectoryOverlap(_)))]
    #[case::trailing_slash("/data/wiki/", |e: &ErrorKind| matches!(e, ErrorKind::DumpsDirectoryOverlap(_)))]
    #[case::ancestor("/data", |e: &ErrorKind| matches!(e, ErrorKind::DumpsDirectoryOverlap(_)))]
    fn test_invalid_dumps_directory(#[case] directory: &str, #[case] expected: fn(&ErrorKind) -> bool) {
        let json = format!(
            r#"{{"run-mode":"init","storage-file":{{"data-directory":"/data/wiki"}},
                "dumps":{{"source":"rsync://mirror.example.org/dumps","directory":"{directory}"}}}}"#
        );
        let err = from_json(&json).unwrap_err();
        assert!(expected(&*err), "unexpected error: {err:?}");
    }

    #[test]
    fn test_dumps_directory_inside_data_directory() {
        let config = from_json(
            r#"{"run-mode":"init","storage-file":{"data-directory":"/data/wiki"},
                "dumps":{"source":"rsync://mirror.example.org/dumps","directory":"/data/wiki/raw/dumps"}}"#,
        )
        .unwrap();
        assert_eq!(config.dumps().map(|(_, directory)| directory), Some(PathBuf::from("/data/wiki/raw/dumps")));
    }

    #[test]
    fn test_missing_explicit_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let err = figment(Some(&temp_dir.path().join("missing.toml")), None).unwrap_err();
        assert!(matches!(&*err, ErrorKind::FileNotFound(_)));
    }

    #[test]
    fn test_layering() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "wikimirror.toml",
                r#"
                    run-mode = "init"
                    [storage-file]
                    data-directory = "/from/file"
                    [snapshot]
                    index-url = "https://file.example.org/"
                "#,
            )?;
            jail.set_env("WIKIMIRROR_SNAPSHOT__INDEX_URL", "https://env.example.org/");
            let file = jail.directory().join("wikimirror.toml");
            let config = Config::load(
                Some(&file),
                Some(r#"{"run-mode":"update","storage-file":{"data-directory":"/from/json"}}"#),
            )
            .unwrap();
            // The invocation overrides the file, the environment overrides both.
            assert_eq!(config.run_mode, RunMode::Update);
            assert_eq!(config.data_directory(), Path::new("/from/json"));
            assert_eq!(config.snapshot.index_url, "https://env.example.org/");
            Ok(())
        });
    }

    #[test]
    fn test_environment_only() {
        Jail::expect_with(|jail| {
            jail.set_env("WIKIMIRROR_RUN_MODE", "update");
            jail.set_env("WIKIMIRROR_STORAGE_FILE__DATA_DIRECTORY", "/from/env");
            let config = Config::load(None, None).unwrap();
            assert_eq!(config.run_mode, RunMode::Update);
            assert_eq!(config.data_directory(), Path::new("/from/env"));
            Ok(())
        });
    }

    #[test]
    fn test_explicit_dumps_directory() {
        let config = from_json(
            r#"{"run-mode":"update","storage-file":{"data-directory":"/data/wiki"},
                "dumps":{"source":"rsync://mirror.example.org/dumps","directory":"/srv/dumps"}}"#,
        )
        .unwrap();
        assert_eq!(
            config.dumps(),
            Some(("rsync://mirror.example.org/dumps", PathBuf::from("/srv/dumps")))
        );
    }
}
