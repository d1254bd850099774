// # Token Source Trait
//
// A token source is one persisted location a bearer token can be read from.
// Sources are read-only and never touch the network; an external credential
// program is what writes them.

use std::fmt;

/// Bearer token for the remote store
///
/// The Debug implementation intentionally does NOT expose the value.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    /// Wrap a raw bearer string
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw bearer string
    /// ⚠️ NEVER log this value
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Token").field(&"<REDACTED>").finish()
    }
}

/// Trait for token source implementations
pub trait TokenSource: Send + Sync {
    /// Read a token, or `None` when this source has no usable value
    ///
    /// Missing or unreadable backing storage is not an error: the source
    /// logs what went wrong and yields `None` so the next source is tried.
    fn read_token(&self) -> Option<Token>;

    /// Get the source name (for logging/debugging)
    fn source_name(&self) -> &'static str;
}
