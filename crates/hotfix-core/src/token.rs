// # Token Store
//
// Resolves a bearer token from an ordered chain of persisted sources.
//
// ## Sources
//
// 1. Hotfix-format file: `+CurveTable=/Auth/Tokens;RowUpdate;{name};{value}`
// 2. JSON object file with named token fields
// 3. Environment variable
//
// The first source yielding a non-empty token wins. No source makes network
// calls; the external credential program is what keeps them fresh.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::config::TokenConfig;
use crate::traits::{Token, TokenSource};

/// Directive prefix of the token rows in the hotfix-format file
const TOKEN_TABLE_PREFIX: &str = "+CurveTable=/Auth/Tokens";

/// Reads tokens from a hotfix-format file
#[derive(Debug, Clone)]
pub struct HotfixTokenFile {
    path: PathBuf,
    preferred: Vec<String>,
}

impl HotfixTokenFile {
    pub fn new(path: impl Into<PathBuf>, preferred: Vec<String>) -> Self {
        Self {
            path: path.into(),
            preferred,
        }
    }

    /// Parse every token row of the file into name → value
    ///
    /// Blank lines and `;` comments are ignored. The value is everything after
    /// the third `;`, so values may themselves contain `;`. A later row for the
    /// same name replaces an earlier one.
    pub fn parse_rows(text: &str) -> HashMap<String, String> {
        let mut rows = HashMap::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with(';') {
                continue;
            }
            let parts: Vec<&str> = line.splitn(4, ';').collect();
            if parts.len() == 4 && parts[0].starts_with(TOKEN_TABLE_PREFIX) && parts[1] == "RowUpdate"
            {
                rows.insert(parts[2].to_string(), parts[3].to_string());
            }
        }
        rows
    }
}

impl TokenSource for HotfixTokenFile {
    fn read_token(&self) -> Option<Token> {
        let text = read_optional(&self.path, self.source_name())?;
        let rows = Self::parse_rows(&text);
        self.preferred.iter().find_map(|name| {
            let value = rows.get(name).filter(|v| !v.is_empty())?;
            tracing::info!("Loaded {} from hotfix token file", name);
            Some(Token::new(value.clone()))
        })
    }

    fn source_name(&self) -> &'static str {
        "hotfix-file"
    }
}

/// Reads tokens from a JSON object file
#[derive(Debug, Clone)]
pub struct JsonTokenFile {
    path: PathBuf,
    fields: Vec<String>,
}

impl JsonTokenFile {
    pub fn new(path: impl Into<PathBuf>, fields: Vec<String>) -> Self {
        Self {
            path: path.into(),
            fields,
        }
    }
}

impl TokenSource for JsonTokenFile {
    fn read_token(&self) -> Option<Token> {
        let text = read_optional(&self.path, self.source_name())?;
        let object: serde_json::Value = match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Failed to parse token file {}: {}", self.path.display(), e);
                return None;
            }
        };

        self.fields.iter().find_map(|field| {
            let value = object.get(field)?.as_str().filter(|v| !v.is_empty())?;
            tracing::info!("Loaded {} from JSON token file", field);
            Some(Token::new(value))
        })
    }

    fn source_name(&self) -> &'static str {
        "json-file"
    }
}

/// Reads a token from an environment variable
#[derive(Debug, Clone)]
pub struct EnvToken {
    var: String,
}

impl EnvToken {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl TokenSource for EnvToken {
    fn read_token(&self) -> Option<Token> {
        std::env::var(&self.var)
            .ok()
            .filter(|v| !v.is_empty())
            .map(Token::new)
    }

    fn source_name(&self) -> &'static str {
        "env"
    }
}

/// Ordered chain of token sources
///
/// # Example
///
/// ```rust,no_run
/// use hotfix_core::config::TokenConfig;
/// use hotfix_core::token::TokenStore;
///
/// let store = TokenStore::from_config(&TokenConfig::default());
/// match store.resolve() {
///     Some(_token) => println!("token available"),
///     None => println!("no token"),
/// }
/// ```
pub struct TokenStore {
    sources: Vec<Box<dyn TokenSource>>,
}

impl TokenStore {
    /// Create a store over explicit sources, tried in the given order
    pub fn new(sources: Vec<Box<dyn TokenSource>>) -> Self {
        Self { sources }
    }

    /// Build the standard chain: hotfix file, JSON file, environment
    pub fn from_config(config: &TokenConfig) -> Self {
        let mut sources: Vec<Box<dyn TokenSource>> = Vec::new();
        if let Some(path) = &config.hotfix_file {
            sources.push(Box::new(HotfixTokenFile::new(
                path,
                config.hotfix_names.clone(),
            )));
        }
        if let Some(path) = &config.json_file {
            sources.push(Box::new(JsonTokenFile::new(path, config.json_names.clone())));
        }
        if let Some(var) = &config.env_var {
            sources.push(Box::new(EnvToken::new(var)));
        }
        Self::new(sources)
    }

    /// Resolve a token from the first source that has one
    ///
    /// Returns `None` rather than erroring; callers decide whether that is fatal.
    pub fn resolve(&self) -> Option<Token> {
        for source in &self.sources {
            if let Some(token) = source.read_token() {
                tracing::debug!("Token resolved from {}", source.source_name());
                return Some(token);
            }
        }
        tracing::debug!("No token found in {} source(s)", self.sources.len());
        None
    }
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.sources.iter().map(|s| s.source_name()).collect();
        f.debug_struct("TokenStore").field("sources", &names).finish()
    }
}

/// Read a file, treating absence as `None` and logging other failures
fn read_optional(path: &Path, source: &str) -> Option<String> {
    if !path.exists() {
        return None;
    }
    match std::fs::read_to_string(path) {
        Ok(text) => Some(text),
        Err(e) => {
            tracing::warn!("Failed to read {} token source {}: {}", source, path.display(), e);
            None
        }
    }
}
