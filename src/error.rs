//! Error types for the extraction core.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("FOOTBALL_API_KEY must be provided or set in environment")]
    MissingApiKey,

    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {path} failed: {source}")]
    Request {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {path} timed out after {timeout:?}")]
    Timeout { path: String, timeout: Duration },

    #[error("http {status} from {path}: {body}")]
    Status {
        path: String,
        status: u16,
        body: String,
    },

    #[error("invalid json from {path}: {reason}")]
    Decode { path: String, reason: String },

    /// Only reachable when the retry policy sets a ceiling.
    #[error("rate limit on {path} still active after {attempts} retries ({waited:?} waited)")]
    RateLimitExhausted {
        path: String,
        attempts: u32,
        waited: Duration,
    },
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("open database {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("create directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
