//! Fetching and classifying remote entries
//!
//! [`Fetcher`] wraps a [`RemoteStore`], turns every 200 body into a
//! [`FetchResult`] and persists a per-key artifact whose extension follows the
//! classification.

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::error::{Error, Result};
use crate::traits::{RawEntry, RemoteResponse, RemoteStore, Token};

/// Directive prefixes that mark a body as hotfix text
const DIRECTIVE_MARKERS: &[&str] = &["+DataTable=", "+CurveTable=", "+TextReplacements="];

/// Number of leading non-empty lines inspected by the directive heuristic
const DIRECTIVE_PROBE_LINES: usize = 5;

/// Classified body of one fetched entry
#[derive(Debug, Clone, PartialEq)]
pub enum FetchResult {
    /// Body parsed as JSON
    Json(serde_json::Value),
    /// Body looks like hotfix directive text
    Directive(String),
    /// Decodable text of no recognized shape
    Text(String),
    /// Not valid UTF-8
    Binary(Vec<u8>),
}

impl FetchResult {
    /// Classify a response body
    ///
    /// Order: UTF-8 decode (else Binary), JSON parse, directive heuristic,
    /// plain text. A leading byte-order mark is stripped before anything else.
    pub fn classify(bytes: &[u8]) -> Self {
        let text = match std::str::from_utf8(bytes) {
            Ok(text) => text.strip_prefix('\u{feff}').unwrap_or(text),
            Err(_) => return FetchResult::Binary(bytes.to_vec()),
        };

        if let Ok(value) = serde_json::from_str::<serde_json::Value>(text) {
            return FetchResult::Json(value);
        }

        if looks_like_directives(text) {
            FetchResult::Directive(text.to_string())
        } else {
            FetchResult::Text(text.to_string())
        }
    }

    /// Short name of the classification (for logging)
    pub fn kind(&self) -> &'static str {
        match self {
            FetchResult::Json(_) => "json",
            FetchResult::Directive(_) => "directive",
            FetchResult::Text(_) => "text",
            FetchResult::Binary(_) => "binary",
        }
    }

    /// Body as text for content filtering
    ///
    /// JSON is compared on its compact serialization; binary has no text.
    pub fn filter_text(&self) -> String {
        match self {
            FetchResult::Json(value) => value.to_string(),
            FetchResult::Directive(text) | FetchResult::Text(text) => text.clone(),
            FetchResult::Binary(_) => String::new(),
        }
    }
}

/// Heuristic for hotfix directive text
fn looks_like_directives(text: &str) -> bool {
    let trimmed = text.trim_start();
    if trimmed.starts_with('[') {
        return true;
    }
    if DIRECTIVE_MARKERS.iter().any(|m| text.contains(m)) {
        return true;
    }
    trimmed
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(DIRECTIVE_PROBE_LINES)
        .any(|line| line.starts_with('[') || line.starts_with('+'))
}

/// Guess a file extension from a content type
fn extension_for_content_type(content_type: Option<&str>, fallback: &'static str) -> &'static str {
    let Some(ct) = content_type else {
        return fallback;
    };
    let ct = ct.to_lowercase();
    if ct.contains("json") {
        ".json"
    } else if ct.contains("xml") {
        ".xml"
    } else if ct.contains("yaml") || ct.contains("yml") {
        ".yml"
    } else if ct.contains("text") {
        ".txt"
    } else {
        fallback
    }
}

/// Fetches entries from a remote store and classifies them
pub struct Fetcher {
    store: Box<dyn RemoteStore>,
    artifact_dir: Option<PathBuf>,
}

impl Fetcher {
    /// Create a fetcher
    ///
    /// # Parameters
    ///
    /// - `store`: Remote store implementation
    /// - `artifact_dir`: Where per-key artifacts go; `None` disables them
    pub fn new(store: Box<dyn RemoteStore>, artifact_dir: Option<PathBuf>) -> Self {
        Self {
            store,
            artifact_dir,
        }
    }

    /// Fetch and classify one key
    ///
    /// # Returns
    ///
    /// - `Ok(RemoteResponse::Ok(FetchResult))`: Fetched, classified, artifact written
    /// - `Ok(other)`: Status passed through from the store
    /// - `Err(Error)`: Transport failure, or the artifact could not be written
    pub async fn fetch(&self, token: &Token, key: &str) -> Result<RemoteResponse<FetchResult>> {
        let response = self.store.fetch(token, key).await?.map(|raw| {
            let result = FetchResult::classify(&raw.bytes);
            (raw, result)
        });
        let (raw, result) = match response {
            RemoteResponse::Ok(pair) => pair,
            other => return Ok(other.map(|(_, result)| result)),
        };

        tracing::info!(
            "[200] {} ({} bytes, {}, content-type={:?})",
            key,
            raw.bytes.len(),
            result.kind(),
            raw.content_type
        );

        if let Some(dir) = &self.artifact_dir {
            let path = write_artifact(dir, key, &raw, &result).await?;
            tracing::debug!("Artifact for {} written to {}", key, path.display());
        }

        Ok(RemoteResponse::Ok(result))
    }

    /// List every key in the store
    pub async fn list_keys(&self, token: &Token) -> Result<RemoteResponse<Vec<String>>> {
        self.store.list_keys(token).await
    }

    /// Name of the wrapped store
    pub fn store_name(&self) -> &'static str {
        self.store.store_name()
    }
}

/// Persist one artifact, named after the key with a classification extension
async fn write_artifact(
    dir: &Path,
    key: &str,
    raw: &RawEntry,
    result: &FetchResult,
) -> Result<PathBuf> {
    fs::create_dir_all(dir).await.map_err(|e| {
        Error::snapshot(format!(
            "Failed to create artifact directory {}: {}",
            dir.display(),
            e
        ))
    })?;

    let content_type = raw.content_type.as_deref();
    let (extension, contents): (&str, Vec<u8>) = match result {
        FetchResult::Json(value) => (".json", serde_json::to_vec_pretty(value)?),
        FetchResult::Directive(text) => (".ini", text.clone().into_bytes()),
        FetchResult::Text(text) => (
            extension_for_content_type(content_type, ".txt"),
            text.clone().into_bytes(),
        ),
        FetchResult::Binary(bytes) => (
            extension_for_content_type(content_type, ".bin"),
            bytes.clone(),
        ),
    };

    let path = dir.join(format!("{}{}", key, extension));
    fs::write(&path, contents).await.map_err(|e| {
        Error::snapshot(format!("Failed to write artifact {}: {}", path.display(), e))
    })?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_binary() {
        let result = FetchResult::classify(&[0xff, 0xfe, 0x00, 0x80]);
        assert!(matches!(result, FetchResult::Binary(_)));
    }

    #[test]
    fn test_classify_json_before_directives() {
        let result = FetchResult::classify(br#"{"RowName": "+DataTable=", "X": 1}"#);
        assert!(matches!(result, FetchResult::Json(_)));
    }

    #[test]
    fn test_classify_bom_stripped() {
        let mut body = vec![0xef, 0xbb, 0xbf];
        body.extend_from_slice(br#"{"X": 2}"#);
        assert_eq!(
            FetchResult::classify(&body),
            FetchResult::Json(serde_json::json!({"X": 2}))
        );
    }

    #[test]
    fn test_classify_section_header() {
        let result = FetchResult::classify(b"\n  [/Script/Engine.Foo]\nKey=Value\n");
        assert!(matches!(result, FetchResult::Directive(_)));
    }

    #[test]
    fn test_classify_marker_anywhere() {
        let body = "line one\nline two\nline three\nline four\nline five\nline six\n\
                    +TextReplacements=(Category=Game)\n";
        assert!(matches!(
            FetchResult::classify(body.as_bytes()),
            FetchResult::Directive(_)
        ));
    }

    #[test]
    fn test_classify_plus_within_first_lines() {
        let body = "note\n\n\n+Something=1\n";
        assert!(matches!(
            FetchResult::classify(body.as_bytes()),
            FetchResult::Directive(_)
        ));
    }

    #[test]
    fn test_classify_plus_after_probe_window_is_text() {
        let body = "a\nb\nc\nd\ne\n+late=1\n";
        assert_eq!(
            FetchResult::classify(body.as_bytes()),
            FetchResult::Text(body.to_string())
        );
    }

    #[test]
    fn test_classify_empty_is_text() {
        assert_eq!(FetchResult::classify(b""), FetchResult::Text(String::new()));
    }

    #[test]
    fn test_extension_guess() {
        assert_eq!(extension_for_content_type(Some("application/XML"), ".bin"), ".xml");
        assert_eq!(extension_for_content_type(Some("text/plain"), ".bin"), ".txt");
        assert_eq!(
            extension_for_content_type(Some("application/octet-stream"), ".bin"),
            ".bin"
        );
        assert_eq!(extension_for_content_type(None, ".txt"), ".txt");
    }

    #[tokio::test]
    async fn test_artifact_extension_follows_classification() {
        let dir = tempfile::tempdir().unwrap();

        let raw = RawEntry::new(br#"{"X":1}"#.to_vec(), Some("text/plain".to_string()));
        let result = FetchResult::classify(&raw.bytes);
        let path = write_artifact(dir.path(), "k1", &raw, &result).await.unwrap();
        assert_eq!(path.file_name().unwrap(), "k1.json");
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("\n  \"X\": 1"));

        let raw = RawEntry::new(b"+DataTable=/A;RowUpdate;R;1".to_vec(), None);
        let result = FetchResult::classify(&raw.bytes);
        let path = write_artifact(dir.path(), "k2", &raw, &result).await.unwrap();
        assert_eq!(path.file_name().unwrap(), "k2.ini");

        let raw = RawEntry::new(vec![0xff, 0x00], None);
        let result = FetchResult::classify(&raw.bytes);
        let path = write_artifact(dir.path(), "k3", &raw, &result).await.unwrap();
        assert_eq!(path.file_name().unwrap(), "k3.bin");
        assert_eq!(std::fs::read(&path).unwrap(), vec![0xff, 0x00]);
    }
}
