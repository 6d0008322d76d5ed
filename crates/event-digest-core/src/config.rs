use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{ErrorCode, Fatal};

/// Environment variable naming the events directory.
pub const ENV_EVENTS_PATH: &str = "GHC_EVENTS_PATH";
/// Environment variable naming the log file.
pub const ENV_LOG_PATH: &str = "GHC_EVENT_DIGEST_LOG_PATH";
/// Environment variable carrying the deployment tag.
pub const ENV_DEPLOYMENT: &str = "GHC_ENV";

/// Deployment environment tag attached to every log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Deployment {
    Production,
    Staging,
    #[default]
    Development,
}

impl Deployment {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Staging => "staging",
            Self::Development => "development",
        }
    }
}

impl fmt::Display for Deployment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Deployment {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "production" => Ok(Self::Production),
            "staging" => Ok(Self::Staging),
            "development" => Ok(Self::Development),
            other => bail!("unknown environment {other:?}; expected production, staging or development"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestConfig {
    #[serde(default = "default_events_dir")]
    pub events_dir: PathBuf,
    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,
    #[serde(default)]
    pub environment: Deployment,
    #[serde(default = "default_input_glob")]
    pub input_glob: String,
    #[serde(default = "default_summary_file")]
    pub summary_file: String,
    #[serde(default = "default_roster_file")]
    pub roster_file: String,
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    /// Size at which the log file is rotated to `<log>.1`. Zero disables it.
    #[serde(default = "default_log_max_megabytes")]
    pub log_max_megabytes: u64,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            events_dir: default_events_dir(),
            log_path: default_log_path(),
            environment: Deployment::default(),
            input_glob: default_input_glob(),
            summary_file: default_summary_file(),
            roster_file: default_roster_file(),
            lock_timeout_ms: default_lock_timeout_ms(),
            log_max_megabytes: default_log_max_megabytes(),
        }
    }
}

fn default_events_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_log_path() -> PathBuf {
    PathBuf::from("/var/log/ghc/event-digest.log")
}

fn default_input_glob() -> String {
    "*.json.gz".to_string()
}

fn default_summary_file() -> String {
    "summary.json".to_string()
}

fn default_roster_file() -> String {
    "users.txt".to_string()
}

const fn default_lock_timeout_ms() -> u64 {
    30_000
}

const fn default_log_max_megabytes() -> u64 {
    100
}

impl DigestConfig {
    /// Path of the summary artifact.
    #[must_use]
    pub fn summary_path(&self) -> PathBuf {
        self.events_dir.join(&self.summary_file)
    }

    /// Path of the roster artifact.
    #[must_use]
    pub fn roster_path(&self) -> PathBuf {
        self.events_dir.join(&self.roster_file)
    }

    #[must_use]
    pub const fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Log rotation threshold in bytes, if rotation is enabled.
    #[must_use]
    pub const fn log_max_bytes(&self) -> Option<u64> {
        match self.log_max_megabytes {
            0 => None,
            mb => Some(mb.saturating_mul(1024 * 1024)),
        }
    }

    /// Apply environment overrides using `lookup` to read variables.
    ///
    /// Empty values are ignored, matching an unset variable.
    ///
    /// # Errors
    ///
    /// Returns an error if `GHC_ENV` holds an unknown environment.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(dir) = get(ENV_EVENTS_PATH) {
            self.events_dir = PathBuf::from(dir);
        }
        if let Some(path) = get(ENV_LOG_PATH) {
            self.log_path = PathBuf::from(path);
        }
        if let Some(raw) = get(ENV_DEPLOYMENT) {
            self.environment = raw
                .parse()
                .with_context(|| format!("invalid {ENV_DEPLOYMENT}"))?;
        }
        Ok(())
    }
}

/// Load a config file. A missing `path` yields the defaults.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not valid TOML.
pub fn load_config_file(path: Option<&Path>) -> Result<DigestConfig> {
    let Some(path) = path else {
        return Ok(DigestConfig::default());
    };

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<DigestConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
        .context(Fatal(ErrorCode::ConfigParseError))
}

/// Resolve the effective config: defaults, then the optional TOML file, then
/// the process environment.
///
/// # Errors
///
/// Returns an error if the file cannot be loaded or an override is invalid.
pub fn resolve_config(path: Option<&Path>) -> Result<DigestConfig> {
    let mut config = load_config_file(path)?;
    config.apply_env_from(|key| env::var(key).ok())?;
    Ok(config)
}
