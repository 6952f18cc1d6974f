//! Error types for the Eddy engine.

use crate::StationId;
use std::time::Duration;
use thiserror::Error;

/// Failure reported by a [`RemoteStore`](crate::RemoteStore).
///
/// Always recoverable: the engine surfaces it to the caller and keeps going.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct RemoteError {
    /// Human-readable description, shown to the user as-is.
    pub message: String,
    /// HTTP status when the failure came from the wire.
    pub status: Option<u16>,
}

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(message: impl Into<String>, status: u16) -> Self {
        Self {
            message: message.into(),
            status: Some(status),
        }
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(format!("remote store timed out after {}ms", after.as_millis()))
    }

    /// True when the remote reported that the record does not exist.
    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }
}

/// Failure from a [`KeyValueStore`](crate::KeyValueStore) backend.
#[derive(Debug, Error)]
pub enum KvError {
    #[error("invalid key '{key}': {reason}")]
    InvalidKey { key: String, reason: &'static str },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// All errors surfaced by the favorites engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Remote failures
    #[error("remote store failure: {0}")]
    Remote(#[from] RemoteError),

    // Durable storage failures
    #[error("cache failure: {0}")]
    Cache(String),

    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    // Validation failures
    #[error("index {index} out of range for {len} favorites")]
    InvalidIndex { index: usize, len: usize },

    #[error("favorite not found: {0}")]
    NotFound(StationId),

    // Concurrency rejection
    #[error("another favorites operation is already in progress")]
    Busy,
}

impl Error {
    /// Whether this error should be stored as the user-visible error message.
    ///
    /// Concurrency rejections are not recorded.
    pub fn is_reportable(&self) -> bool {
        !matches!(self, Error::Busy)
    }
}

impl From<KvError> for Error {
    fn from(e: KvError) -> Self {
        Error::Cache(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::InvalidSnapshot(e.to_string())
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
