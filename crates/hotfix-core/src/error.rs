//! Error types for the hotfix pipeline
//!
//! This module defines all error types used throughout the crate.
//!
//! Per-key conditions (absence, unauthorized, other HTTP statuses) are not
//! errors here: they travel as [`RemoteResponse`](crate::traits::RemoteResponse)
//! variants so the fetch loop can decide locally. Only conditions that abort a
//! run surface as [`Error`].

use thiserror::Error;

/// Result type alias for hotfix operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the hotfix pipeline
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors (fatal at startup)
    #[error("Configuration error: {0}")]
    Config(String),

    /// No token could be resolved from any source
    #[error("Token unavailable: {0}")]
    TokenUnavailable(String),

    /// Unauthorized even after the single refresh-and-retry
    #[error("Unauthorized after refresh: {0}")]
    Unauthorized(String),

    /// Key listing failed for a reason other than authorization
    #[error("Listing failed: {0}")]
    Listing(String),

    /// Transport-level HTTP failures (connect, timeout, body read)
    #[error("HTTP error: {0}")]
    Http(String),

    /// Snapshot staging/commit errors
    #[error("Snapshot error: {0}")]
    Snapshot(String),

    /// External command errors (spawn failures)
    #[error("Command error: {0}")]
    Command(String),

    /// Notification delivery errors
    #[error("Notification error: {0}")]
    Notify(String),

    /// Filesystem errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Rule file parse errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Invalid table pattern in a rule
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a token-unavailable error
    pub fn token_unavailable(msg: impl Into<String>) -> Self {
        Self::TokenUnavailable(msg.into())
    }

    /// Create an unauthorized-after-refresh error
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    /// Create a listing error
    pub fn listing(msg: impl Into<String>) -> Self {
        Self::Listing(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create a snapshot error
    pub fn snapshot(msg: impl Into<String>) -> Self {
        Self::Snapshot(msg.into())
    }

    /// Create a command error
    pub fn command(msg: impl Into<String>) -> Self {
        Self::Command(msg.into())
    }

    /// Create a notification error
    pub fn notify(msg: impl Into<String>) -> Self {
        Self::Notify(msg.into())
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
