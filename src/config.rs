use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_BASE_URL: &str = "https://api.football-data.org/v4";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

const DATA_DIR: &str = "football_etl";
const DB_FILE: &str = "raw.sqlite";
const FALLBACK_DB_FILE: &str = "football_etl_raw.sqlite";

/// Upstream API settings. Built explicitly or via [`ApiConfig::from_env`].
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl ApiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_key = lookup("FOOTBALL_API_KEY").and_then(non_empty);
        let base_url = lookup("FOOTBALL_API_BASE_URL")
            .and_then(non_empty)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let timeout_secs = parse_opt::<u64>(&lookup, "FOOTBALL_API_TIMEOUT_SECS")?
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        let max_retries = parse_opt::<u32>(&lookup, "FOOTBALL_API_MAX_RATE_LIMIT_RETRIES")?;
        let max_total_wait = parse_opt::<u64>(&lookup, "FOOTBALL_API_MAX_RATE_LIMIT_WAIT_SECS")?
            .map(Duration::from_secs);

        Ok(Self {
            api_key,
            base_url,
            timeout: Duration::from_secs(timeout_secs),
            retry: RetryPolicy {
                max_retries,
                max_total_wait,
            },
        })
    }
}

/// Ceiling for the rate-limit retry loop. `None` on both fields keeps
/// retrying for as long as the server keeps answering 429.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: Option<u32>,
    pub max_total_wait: Option<Duration>,
}

impl RetryPolicy {
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Whether another wait of `next_wait` is allowed after `attempts`
    /// retries that have already slept `waited` in total.
    pub fn allows(&self, attempts: u32, waited: Duration, next_wait: Duration) -> bool {
        if self.max_retries.is_some_and(|max| attempts >= max) {
            return false;
        }
        if self
            .max_total_wait
            .is_some_and(|max| waited.saturating_add(next_wait) > max)
        {
            return false;
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Database {
    File(PathBuf),
    Memory,
}

/// Storage target. The database is attached under the `raw` schema name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub database: Database,
}

impl StoreConfig {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            database: Database::File(path.into()),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            database: Database::Memory,
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        match lookup("FOOTBALL_DB_PATH").and_then(non_empty) {
            Some(raw) if raw == ":memory:" => Self::in_memory(),
            Some(raw) => Self::file(raw),
            None => Self::file(default_db_path(&lookup)),
        }
    }

    /// Value handed to `ATTACH DATABASE`.
    pub fn attach_target(&self) -> String {
        match &self.database {
            Database::File(path) => path.to_string_lossy().into_owned(),
            Database::Memory => ":memory:".to_string(),
        }
    }
}

fn default_db_path(lookup: &impl Fn(&str) -> Option<String>) -> PathBuf {
    // Prefer XDG data.
    if let Some(base) = lookup("XDG_DATA_HOME").and_then(non_empty) {
        return PathBuf::from(base).join(DATA_DIR).join(DB_FILE);
    }
    if let Some(home) = lookup("HOME").and_then(non_empty) {
        return PathBuf::from(home)
            .join(".local")
            .join("share")
            .join(DATA_DIR)
            .join(DB_FILE);
    }
    PathBuf::from(FALLBACK_DB_FILE)
}

fn parse_opt<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    let Some(raw) = lookup(key).and_then(non_empty) else {
        return Ok(None);
    };
    raw.parse::<T>()
        .map(Some)
        .map_err(|_| ConfigError::InvalidValue { key, value: raw })
}

fn non_empty(raw: String) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
