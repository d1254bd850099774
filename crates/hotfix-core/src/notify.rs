//! Notice policy
//!
//! Update and error notices are always delivered; informational notices only
//! when enabled. Delivery problems are logged and never fail a cycle.

use async_trait::async_trait;

use crate::config::NotifyConfig;
use crate::error::Result;
use crate::traits::{Notice, NoticeKind, Notifier};

/// Notifier that only writes to the log
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, notice: &Notice) -> Result<()> {
        match notice.kind {
            NoticeKind::Error => tracing::error!("[NOTICE] {}", notice.text),
            NoticeKind::Update | NoticeKind::Info => tracing::info!("[NOTICE] {}", notice.text),
        }
        Ok(())
    }

    fn notifier_name(&self) -> &'static str {
        "log"
    }
}

/// Formats notices and applies the delivery policy
pub struct Announcer {
    notifier: Box<dyn Notifier>,
    optional_notices: bool,
    mention_everyone: bool,
}

impl Announcer {
    pub fn new(notifier: Box<dyn Notifier>, config: &NotifyConfig) -> Self {
        Self {
            notifier,
            optional_notices: config.optional_notices,
            mention_everyone: config.mention_everyone_on_update,
        }
    }

    /// Informational notice, dropped unless optional notices are enabled
    pub async fn info(&self, message: &str) {
        if !self.optional_notices {
            tracing::debug!("Optional notice suppressed: {}", message);
            return;
        }
        self.send(Notice::new(NoticeKind::Info, format!("ℹ️ {}", message)))
            .await;
    }

    /// Error notice, always delivered
    pub async fn error(&self, message: &str) {
        self.send(Notice::new(NoticeKind::Error, format!("❌ {}", message)))
            .await;
    }

    /// Update notice listing changed tables, always delivered
    pub async fn update(&self, tables: &[String]) {
        let mut text = String::new();
        if self.mention_everyone {
            text.push_str("@everyone\n");
        }
        text.push_str("✅ Hotfix updated\nChanged tables:");
        for table in tables {
            text.push_str("\n- ");
            text.push_str(table);
        }
        self.send(Notice::new(NoticeKind::Update, text)).await;
    }

    pub fn notifier_name(&self) -> &'static str {
        self.notifier.notifier_name()
    }

    async fn send(&self, notice: Notice) {
        if let Err(e) = self.notifier.deliver(&notice).await {
            tracing::warn!(
                "Failed to deliver {:?} notice via {}: {}",
                notice.kind,
                self.notifier.notifier_name(),
                e
            );
        }
    }
}

impl std::fmt::Debug for Announcer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Announcer")
            .field("notifier", &self.notifier.notifier_name())
            .field("optional_notices", &self.optional_notices)
            .field("mention_everyone", &self.mention_everyone)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Recorder {
        sent: Arc<Mutex<Vec<Notice>>>,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for Recorder {
        async fn deliver(&self, notice: &Notice) -> Result<()> {
            self.sent.lock().unwrap().push(notice.clone());
            if self.fail {
                return Err(Error::notify("sink down"));
            }
            Ok(())
        }

        fn notifier_name(&self) -> &'static str {
            "recorder"
        }
    }

    fn announcer(recorder: &Recorder, optional: bool, mention: bool) -> Announcer {
        let config = NotifyConfig {
            optional_notices: optional,
            mention_everyone_on_update: mention,
        };
        Announcer::new(Box::new(recorder.clone()), &config)
    }

    #[tokio::test]
    async fn test_optional_notices_suppressed_by_default() {
        let recorder = Recorder::default();
        let announcer = announcer(&recorder, false, true);

        announcer.info("checking").await;
        announcer.error("boom").await;

        let sent = recorder.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0], Notice::new(NoticeKind::Error, "❌ boom"));
    }

    #[tokio::test]
    async fn test_optional_notices_enabled() {
        let recorder = Recorder::default();
        announcer(&recorder, true, false).info("checking").await;
        assert_eq!(
            recorder.sent.lock().unwrap()[0],
            Notice::new(NoticeKind::Info, "ℹ️ checking")
        );
    }

    #[tokio::test]
    async fn test_update_text() {
        let recorder = Recorder::default();
        let tables = vec!["Foo".to_string(), "Bar".to_string()];

        announcer(&recorder, false, true).update(&tables).await;
        announcer(&recorder, false, false).update(&tables).await;

        let sent = recorder.sent.lock().unwrap();
        assert_eq!(
            sent[0].text,
            "@everyone\n✅ Hotfix updated\nChanged tables:\n- Foo\n- Bar"
        );
        assert_eq!(sent[1].text, "✅ Hotfix updated\nChanged tables:\n- Foo\n- Bar");
        assert_eq!(sent[1].kind, NoticeKind::Update);
    }

    #[tokio::test]
    async fn test_delivery_failure_is_swallowed() {
        let recorder = Recorder {
            fail: true,
            ..Recorder::default()
        };
        announcer(&recorder, false, false).error("boom").await;
        assert_eq!(recorder.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_log_notifier_always_succeeds() {
        let notice = Notice::new(NoticeKind::Update, "text");
        assert!(LogNotifier.deliver(&notice).await.is_ok());
        assert_eq!(LogNotifier.notifier_name(), "log");
    }
}
