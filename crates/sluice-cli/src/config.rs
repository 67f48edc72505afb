//! Configuration file support.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use sluice_http::RetryPolicy;
use sluice_prep::{KeyBounds, KeySearch};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Root of the artifact store. Relative paths below resolve against it.
    pub data_dir: PathBuf,
    pub log: LogConfig,
    pub fetch: FetchConfig,
    pub keys: KeysConfig,
    pub load: LoadConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// Stderr level when `RUST_LOG` is unset.
    pub level: String,
    /// Debug-level log file. Empty disables it.
    pub file: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchConfig {
    pub url: String,
    /// Total attempts, the first one included.
    pub attempts: u32,
    pub backoff_factor: f64,
    pub max_backoff_secs: u64,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KeysConfig {
    pub min_len: usize,
    /// Absent means one less than the column count.
    pub max_len: Option<usize>,
    pub first_tier_only: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoadConfig {
    pub database: PathBuf,
    pub table: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            log: LogConfig::default(),
            fetch: FetchConfig::default(),
            keys: KeysConfig::default(),
            load: LoadConfig::default(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            file: PathBuf::from("data_prep_pipeline.log"),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            url: "https://jsonplaceholder.typicode.com/posts".into(),
            attempts: RetryPolicy::DEFAULT_ATTEMPTS,
            backoff_factor: 1.0,
            max_backoff_secs: RetryPolicy::DEFAULT_MAX_BACKOFF.as_secs(),
            timeout_secs: 30,
        }
    }
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self {
            min_len: 1,
            max_len: None,
            first_tier_only: false,
        }
    }
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("load.db"),
            table: sluice_sqlite::TableSchema::DEFAULT_TABLE.into(),
        }
    }
}

impl Config {
    /// Load config from a specific path. A missing file yields defaults.
    pub fn load_from_path(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Get the default config file path.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("sluice").join("config.toml"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.fetch.attempts == 0 {
            bail!("fetch.attempts must be at least 1");
        }
        if !(self.fetch.backoff_factor >= 0.0) {
            bail!("fetch.backoff_factor must not be negative");
        }
        if self.fetch.url.is_empty() {
            bail!("fetch.url must not be empty");
        }
        self.key_search().context("invalid [keys] section")?;
        sluice_sqlite::TableSchema::cleaned_data(self.load.table.as_str())
            .context("invalid load.table")?;
        Ok(())
    }

    /// Resolve `path` against the data directory unless it is absolute.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_dir.join(path)
        }
    }

    pub fn log_file(&self) -> Option<PathBuf> {
        if self.log.file.as_os_str().is_empty() {
            None
        } else {
            Some(self.resolve(&self.log.file))
        }
    }

    pub fn database(&self) -> PathBuf {
        self.resolve(&self.load.database)
    }

    pub fn key_search(&self) -> Result<KeySearch> {
        let bounds = KeyBounds::new(self.keys.min_len, self.keys.max_len)?;
        Ok(KeySearch::new(bounds).first_tier_only(self.keys.first_tier_only))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.fetch.attempts)
            .with_backoff_factor(self.fetch.backoff_factor)
            .with_max_backoff(Duration::from_secs(self.fetch.max_backoff_secs))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.fetch.timeout_secs)
    }
}
