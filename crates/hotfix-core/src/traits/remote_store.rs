// # Remote Store Trait
//
// Defines the interface for reading entries from the remote key-value store.
//
// ## Implementations
//
// - HTTPS cloud storage: `hotfix-store-http` crate
//
// ## Trust Level
//
// Stores are single-shot: one request per call, no retry, no refresh, no
// caching. The engine owns the refresh-and-retry policy, so an adapter
// reports `Unauthorized` and lets the caller decide.

use async_trait::async_trait;

use super::token_source::Token;

/// Outcome of one call against the remote store
///
/// Every status the store can answer with is a variant, so callers
/// pattern-match instead of catching errors. `Err(Error)` is reserved for
/// transport failures where no status was received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteResponse<T> {
    /// Status 200 with a payload
    Ok(T),
    /// Status 404; the entry is absent
    NotFound,
    /// Status 401; the token was rejected
    Unauthorized,
    /// Any other status
    Failed {
        /// HTTP status code
        status: u16,
        /// Reason phrase reported for the status
        reason: String,
        /// Response body, when the server sent a parseable one
        detail: Option<String>,
    },
}

impl<T> RemoteResponse<T> {
    /// Transform the payload of a successful response
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> RemoteResponse<U> {
        match self {
            RemoteResponse::Ok(value) => RemoteResponse::Ok(f(value)),
            RemoteResponse::NotFound => RemoteResponse::NotFound,
            RemoteResponse::Unauthorized => RemoteResponse::Unauthorized,
            RemoteResponse::Failed {
                status,
                reason,
                detail,
            } => RemoteResponse::Failed {
                status,
                reason,
                detail,
            },
        }
    }

    /// Whether the store rejected the token
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, RemoteResponse::Unauthorized)
    }
}

/// Raw body of a fetched entry, before classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    /// Response body bytes
    pub bytes: Vec<u8>,
    /// `Content-Type` header, if any
    pub content_type: Option<String>,
}

impl RawEntry {
    /// Create a raw entry from bytes and an optional content type
    pub fn new(bytes: impl Into<Vec<u8>>, content_type: Option<String>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type,
        }
    }
}

/// Trait for remote store implementations
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch one entry by key
    ///
    /// # Returns
    ///
    /// - `Ok(RemoteResponse)`: The store answered with a status
    /// - `Err(Error)`: No status was received (connection, timeout, body read)
    async fn fetch(
        &self,
        token: &Token,
        key: &str,
    ) -> Result<RemoteResponse<RawEntry>, crate::Error>;

    /// List every key the store currently holds
    async fn list_keys(&self, token: &Token) -> Result<RemoteResponse<Vec<String>>, crate::Error>;

    /// Get the store name (for logging/debugging)
    fn store_name(&self) -> &'static str;
}
