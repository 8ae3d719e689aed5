use std::path::{Path, PathBuf};

use review_core::analytics::DEFAULT_WINDOW_DAYS;
use review_core::model::SchedulerParams;
use serde::Deserialize;
use services::EngineSettings;
use thiserror::Error;

pub const DEFAULT_DB_URL: &str = "sqlite://review.sqlite3";
pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("analytics window must be at least one day")]
    InvalidAnalyticsWindow,

    #[error("invalid database url: {0}")]
    InvalidDbUrl(String),
}

/// Optional TOML overrides pointed at by `REVIEW_CONFIG`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    scheduler: SchedulerParams,
    analytics: AnalyticsSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct AnalyticsSection {
    window_days: u32,
}

impl Default for AnalyticsSection {
    fn default() -> Self {
        Self {
            window_days: DEFAULT_WINDOW_DAYS,
        }
    }
}

/// Process configuration assembled from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_url: String,
    pub log_level: String,
    pub settings: EngineSettings,
}

impl AppConfig {
    /// Read `REVIEW_DB_URL`, `REVIEW_LOG_LEVEL` (or `RUST_LOG`) and `REVIEW_CONFIG`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the config file cannot be read or parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let db_url = lookup("REVIEW_DB_URL")
            .filter(|v| !v.trim().is_empty())
            .map_or_else(|| DEFAULT_DB_URL.to_owned(), normalize_sqlite_url);
        let log_level = lookup("REVIEW_LOG_LEVEL")
            .or_else(|| lookup("RUST_LOG"))
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_owned());

        let file = match lookup("REVIEW_CONFIG") {
            Some(path) => load_file(Path::new(&path))?,
            None => FileConfig::default(),
        };
        if file.analytics.window_days == 0 {
            return Err(ConfigError::InvalidAnalyticsWindow);
        }

        Ok(Self {
            db_url,
            log_level,
            settings: EngineSettings {
                scheduler: file.scheduler,
                analytics_window_days: file.analytics.window_days,
            },
        })
    }

    #[must_use]
    pub fn with_db_url(mut self, raw: String) -> Self {
        self.db_url = normalize_sqlite_url(raw);
        self
    }
}

fn load_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Turn a bare path or `sqlite:` path into an absolute `sqlite://` URL.
#[must_use]
pub fn normalize_sqlite_url(raw: String) -> String {
    if raw.starts_with("sqlite::memory:") || raw.starts_with("sqlite://") || raw.starts_with("sqlite:file:") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

/// Make sure the database file and its directory exist before connecting.
///
/// # Errors
///
/// Returns an error if the url is not a file url or the file cannot be created.
pub fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url.starts_with("sqlite::memory:") || db_url.starts_with("sqlite:file:") {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ConfigError::InvalidDbUrl(db_url.to_string()))?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ConfigError::InvalidDbUrl(db_url.to_string()).into());
    }

    let path = Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}
