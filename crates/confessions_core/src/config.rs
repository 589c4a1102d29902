//! Runtime configuration.
//!
//! # Responsibility
//! - Describe where records live, where device-local data goes, and how
//!   the process logs.
//! - Load settings from a JSON file or `CONFESSIONS_*` environment variables.
//!
//! # Invariants
//! - Blank values count as unset and fall back to defaults.
//! - A loaded config has passed [`AppConfig::validate`].

use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_PREFIX: &str = "CONFESSIONS_";
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
pub const DB_FILE_NAME: &str = "confessions.sqlite3";
const DEFAULT_DATA_DIR_NAME: &str = "confessions";

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse(serde_json::Error),
    InvalidValue { key: &'static str, value: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid config JSON: {err}"),
            Self::InvalidValue { key, value } => write!(f, "invalid value for {key}: `{value}`"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::InvalidValue { .. } => None,
        }
    }
}

/// Process-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Base URL of the remote record collection. `None` keeps records in the
    /// local SQLite database instead.
    pub store_url: Option<String>,
    /// Directory for the SQLite database and log files.
    pub data_dir: PathBuf,
    /// Author label on new comments.
    pub author_label: String,
    pub request_timeout_ms: u64,
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store_url: None,
            data_dir: std::env::temp_dir().join(DEFAULT_DATA_DIR_NAME),
            author_label: crate::model::comment::ANONYMOUS_AUTHOR.to_string(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            log_level: crate::logging::default_log_level().to_string(),
        }
    }
}

impl AppConfig {
    /// Reads `CONFESSIONS_STORE_URL`, `CONFESSIONS_DATA_DIR`,
    /// `CONFESSIONS_AUTHOR`, `CONFESSIONS_TIMEOUT_MS` and
    /// `CONFESSIONS_LOG_LEVEL` on top of the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`Self::from_env`] with an injectable variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |suffix: &str| {
            lookup(&format!("{ENV_PREFIX}{suffix}"))
                .map(|raw| raw.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let mut config = Self::default();
        if let Some(url) = var("STORE_URL") {
            config.store_url = Some(url);
        }
        if let Some(dir) = var("DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(author) = var("AUTHOR") {
            config.author_label = author;
        }
        if let Some(raw) = var("TIMEOUT_MS") {
            config.request_timeout_ms =
                raw.parse().map_err(|_| ConfigError::InvalidValue {
                    key: "request_timeout_ms",
                    value: raw.clone(),
                })?;
        }
        if let Some(level) = var("LOG_LEVEL") {
            config.log_level = level;
        }
        config.normalized()
    }

    /// Loads a JSON config file. Missing keys take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw).map_err(ConfigError::Parse)?;
        config.normalized()
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE_NAME)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Checks values that serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(url) = &self.store_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::InvalidValue {
                    key: "store_url",
                    value: url.clone(),
                });
            }
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "request_timeout_ms",
                value: "0".to_string(),
            });
        }
        if !self.data_dir.is_absolute() {
            return Err(ConfigError::InvalidValue {
                key: "data_dir",
                value: self.data_dir.display().to_string(),
            });
        }
        Ok(())
    }

    fn normalized(mut self) -> Result<Self, ConfigError> {
        self.store_url = self
            .store_url
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty());
        if self.author_label.trim().is_empty() {
            self.author_label = crate::model::comment::ANONYMOUS_AUTHOR.to_string();
        }
        self.validate()?;
        Ok(self)
    }
}
