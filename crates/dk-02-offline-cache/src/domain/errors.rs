//! Error types for the offline cache controller.

use super::lifecycle::WorkerState;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Cache and fetch errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("cache storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("cache quota exceeded: {needed} bytes needed, {available} available")]
    QuotaExceeded { needed: usize, available: usize },

    #[error("network request failed: {0}")]
    Network(String),

    #[error("network request timed out after {0:?}")]
    NetworkTimeout(Duration),

    #[error("bad precache response for {url}: status {status}")]
    BadPrecacheResponse { url: String, status: u16 },

    #[error("conflicting precache entries for {url}")]
    ConflictingPrecacheEntries { url: String },

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("invalid cache configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid worker state transition: {from:?} -> {to:?}")]
    InvalidState { from: WorkerState, to: WorkerState },
}

/// Push and notification errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PushError {
    /// Push data present but not a JSON object
    #[error("malformed push payload: {0}")]
    Malformed(String),

    /// The notification host rejected the call
    #[error("notification host error: {0}")]
    Host(String),
}

/// Precache manifest generation errors
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("i/o error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("manifest serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl ManifestError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ManifestError::Io {
            path: path.into(),
            source,
        }
    }
}
