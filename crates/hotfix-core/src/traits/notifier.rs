// # Notifier Trait
//
// Delivers plain-text notices to a chat sink. Whether a notice is sent at all
// is decided by `notify::Announcer`; implementations only deliver.

use async_trait::async_trait;

/// Category of a notice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    /// Progress chatter; optional
    Info,
    /// Changed tables detected; always sent
    Update,
    /// Failure that needs attention; always sent
    Error,
}

/// One rendered notice
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub text: String,
}

impl Notice {
    pub fn new(kind: NoticeKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }
}

/// Trait for notification sinks
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one notice
    async fn deliver(&self, notice: &Notice) -> Result<(), crate::Error>;

    /// Get the notifier name (for logging/debugging)
    fn notifier_name(&self) -> &'static str;
}
