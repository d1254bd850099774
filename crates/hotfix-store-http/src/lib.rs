// # Cloud Storage Store
//
// HTTPS adapter for the remote system bucket.
//
// - Makes exactly one HTTP request per call
// - Maps status codes to `RemoteResponse` variants; only transport failures
//   are errors
// - NO retry, NO token refresh, NO caching (owned by the core engine)
//
// ## Security Requirements
//
// - The bearer token NEVER appears in logs or `Debug` output
//
// ## API Reference
//
// - Fetch one entry: GET `{host}{system_path}/{key}`
// - List entries: GET `{host}{system_path}` returning
//   `[{"uniqueFilename": "...", ...}, ...]`

use async_trait::async_trait;
use hotfix_core::config::RemoteConfig;
use hotfix_core::traits::{RawEntry, RemoteResponse, RemoteStore, Token};
use hotfix_core::{Error, Result};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use serde::Deserialize;
use std::time::Duration;

/// One object of the listing response
#[derive(Debug, Deserialize)]
struct ListingEntry {
    #[serde(rename = "uniqueFilename")]
    unique_filename: Option<String>,
}

/// Remote store backed by the cloud storage HTTP API
///
/// Stateless apart from the HTTP client; the token is passed per call.
pub struct CloudStorageStore {
    /// `{host}{system_path}` without trailing slash
    base_url: String,

    user_agent: String,

    client: reqwest::Client,
}

impl CloudStorageStore {
    /// Create a store for the configured host
    ///
    /// # Errors
    ///
    /// `Error::Http` if the HTTP client cannot be built.
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        let base_url = format!(
            "{}{}",
            config.host.trim_end_matches('/'),
            config.system_path.trim_end_matches('/')
        );

        Ok(Self {
            base_url,
            user_agent: config.user_agent.clone(),
            client,
        })
    }

    /// URL of one entry
    pub fn entry_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key)
    }

    async fn get(&self, url: &str, token: &Token) -> Result<reqwest::Response> {
        self.client
            .get(url)
            .bearer_auth(token.expose())
            .header(ACCEPT, "*/*")
            .header(USER_AGENT, &self.user_agent)
            .send()
            .await
            .map_err(|e| Error::http(format!("GET {} failed: {}", url, e)))
    }
}

impl std::fmt::Debug for CloudStorageStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudStorageStore")
            .field("base_url", &self.base_url)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

/// Map a non-200 response to its variant
///
/// The body is kept as detail only when it parses as JSON.
async fn non_success<T>(response: reqwest::Response) -> RemoteResponse<T> {
    let status = response.status();
    match status {
        StatusCode::NOT_FOUND => RemoteResponse::NotFound,
        StatusCode::UNAUTHORIZED => RemoteResponse::Unauthorized,
        _ => {
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .map(|_| body);
            RemoteResponse::Failed {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
                detail,
            }
        }
    }
}

#[async_trait]
impl RemoteStore for CloudStorageStore {
    async fn fetch(&self, token: &Token, key: &str) -> Result<RemoteResponse<RawEntry>> {
        let url = self.entry_url(key);
        tracing::debug!("GET {}", url);
        let response = self.get(&url, token).await?;

        if response.status() != StatusCode::OK {
            return Ok(non_success(response).await);
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::http(format!("Failed to read body of {}: {}", key, e)))?;

        Ok(RemoteResponse::Ok(RawEntry::new(bytes.to_vec(), content_type)))
    }

    async fn list_keys(&self, token: &Token) -> Result<RemoteResponse<Vec<String>>> {
        tracing::debug!("GET {}", self.base_url);
        let response = self.get(&self.base_url, token).await?;

        if response.status() != StatusCode::OK {
            return Ok(non_success(response).await);
        }

        let entries: Vec<ListingEntry> = response
            .json()
            .await
            .map_err(|e| Error::http(format!("Invalid listing response: {}", e)))?;

        let keys = entries
            .into_iter()
            .filter_map(|entry| entry.unique_filename)
            .collect();
        Ok(RemoteResponse::Ok(keys))
    }

    fn store_name(&self) -> &'static str {
        "cloudstorage"
    }
}
