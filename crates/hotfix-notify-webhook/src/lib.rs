// # Webhook Notifier
//
// Delivers notices to a chat webhook as `{"content": "<text>"}`.
//
// - One POST per notice
// - NO retry: a failed delivery is returned to the caller, which logs it
//
// ## Security Requirements
//
// - The webhook URL embeds its credential and NEVER appears in `Debug` output

use async_trait::async_trait;
use hotfix_core::traits::{Notice, Notifier};
use hotfix_core::{Error, Result};
use std::time::Duration;

/// Delivery timeout for a single notice
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Notifier posting to a chat webhook URL
pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    /// # Errors
    ///
    /// `Error::Config` for a URL without an HTTP(S) scheme, `Error::Http` if
    /// the client cannot be built.
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        if !url.starts_with("https://") && !url.starts_with("http://") {
            return Err(Error::config("Webhook URL must use HTTP or HTTPS scheme"));
        }

        let client = reqwest::Client::builder()
            .timeout(DELIVERY_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { url, client })
    }
}

impl std::fmt::Debug for WebhookNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookNotifier")
            .field("url", &"<redacted>")
            .finish()
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn deliver(&self, notice: &Notice) -> Result<()> {
        let body = serde_json::json!({ "content": notice.text });

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::notify(format!("Webhook request failed: {}", e.without_url())))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::notify(format!("Webhook returned status {}", status)));
        }

        tracing::debug!("Delivered {:?} notice", notice.kind);
        Ok(())
    }

    fn notifier_name(&self) -> &'static str {
        "webhook"
    }
}
