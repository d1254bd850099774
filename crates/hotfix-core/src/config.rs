//! Configuration types for the hotfix pipeline
//!
//! This module defines all configuration structures used throughout the crate.
//! Every path, URL and flag lives here and is passed to components at
//! construction time.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default remote host
pub const DEFAULT_HOST: &str = "https://fngw-mcp-gc-livefn.ol.epicgames.com";

/// Default path of the system bucket on the remote host
pub const DEFAULT_SYSTEM_PATH: &str = "/fortnite/api/cloudstorage/system";

/// Keys fetched when neither a static list nor listing mode is configured
pub const DEFAULT_KEYS: &[&str] = &[
    "d16053edfaa74782b72283b51e7d393f",
    "a22d837b6a2b46349421259c0a5411bf",
    "56335419f8794c71ba727c8f6e935af2",
    "f60cbea9f6d24c5a855056088b15f447",
];

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotfixConfig {
    /// Remote store settings
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Token source settings
    #[serde(default)]
    pub tokens: TokenConfig,

    /// Credential refresh settings
    #[serde(default)]
    pub refresh: RefreshConfig,

    /// Key selection and fetch loop settings
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Canonical document and changed-tables artifact
    #[serde(default)]
    pub output: OutputConfig,

    /// Notice policy
    #[serde(default)]
    pub notify: NotifyConfig,

    /// Optional git publish step
    #[serde(default)]
    pub publish: Option<PublishConfig>,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl HotfixConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self {
            remote: RemoteConfig::default(),
            tokens: TokenConfig::default(),
            refresh: RefreshConfig::default(),
            fetch: FetchConfig::default(),
            output: OutputConfig::default(),
            notify: NotifyConfig::default(),
            publish: None,
            engine: EngineConfig::default(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.remote.validate()?;
        self.fetch.validate()?;

        if self.output.document_path.as_os_str().is_empty() {
            return Err(crate::Error::config("Document path cannot be empty"));
        }

        if self.refresh.command.first().is_some_and(|p| p.is_empty()) {
            return Err(crate::Error::config("Refresh command program cannot be empty"));
        }

        if let Some(publish) = &self.publish {
            publish.validate()?;
        }

        if self.engine.watch_interval_secs == 0 {
            return Err(crate::Error::config("Watch interval must be > 0"));
        }

        Ok(())
    }
}

impl Default for HotfixConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Remote store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Scheme and host, without trailing slash
    #[serde(default = "default_host")]
    pub host: String,

    /// Path of the system bucket; keys are appended as one more segment
    #[serde(default = "default_system_path")]
    pub system_path: String,

    /// Request timeout (in seconds)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// `User-Agent` header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl RemoteConfig {
    /// Validate the remote configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.host.is_empty() {
            return Err(crate::Error::config("Remote host cannot be empty"));
        }
        if !self.host.starts_with("https://") && !self.host.starts_with("http://") {
            return Err(crate::Error::config(format!(
                "Remote host must use HTTP or HTTPS scheme. Got: {}",
                self.host
            )));
        }
        if self.timeout_secs == 0 {
            return Err(crate::Error::config("Remote timeout must be > 0"));
        }
        Ok(())
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            system_path: default_system_path(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

/// Token source configuration
///
/// Sources are tried in a fixed order: hotfix-format file, JSON file,
/// environment variable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    /// File of `+CurveTable=/Auth/Tokens;RowUpdate;{name};{value}` lines
    #[serde(default)]
    pub hotfix_file: Option<PathBuf>,

    /// Names looked up in the hotfix-format file, in preference order
    #[serde(default = "default_hotfix_token_names")]
    pub hotfix_names: Vec<String>,

    /// JSON object file with named token fields
    #[serde(default)]
    pub json_file: Option<PathBuf>,

    /// Fields looked up in the JSON file, in preference order
    #[serde(default = "default_json_token_names")]
    pub json_names: Vec<String>,

    /// Environment variable holding a token
    #[serde(default = "default_token_env")]
    pub env_var: Option<String>,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            hotfix_file: None,
            hotfix_names: default_hotfix_token_names(),
            json_file: None,
            json_names: default_json_token_names(),
            env_var: default_token_env(),
        }
    }
}

/// Credential refresh configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// Credential program argv; empty means "re-read sources only"
    #[serde(default)]
    pub command: Vec<String>,

    /// Wait after a successful credential program run (in milliseconds)
    ///
    /// Gives the program time to finish writing the token sources.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            settle_delay_ms: default_settle_delay_ms(),
        }
    }
}

/// Key selection and fetch loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Static keys, used when `fetch_all` is false
    #[serde(default = "default_keys")]
    pub keys: Vec<String>,

    /// Discover keys through the listing call instead of `keys`
    #[serde(default)]
    pub fetch_all: bool,

    /// Delay between consecutive fetches (in milliseconds)
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    /// Only aggregate entries whose body contains this text
    #[serde(default)]
    pub filter_text: Option<String>,

    /// Directory receiving one artifact file per fetched key
    #[serde(default)]
    pub artifact_dir: Option<PathBuf>,
}

impl FetchConfig {
    /// Validate the fetch configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if !self.fetch_all && self.keys.is_empty() {
            return Err(crate::Error::config(
                "No keys configured and listing mode is disabled",
            ));
        }
        if self.keys.iter().any(|k| k.trim().is_empty()) {
            return Err(crate::Error::config("Keys cannot be empty strings"));
        }
        Ok(())
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            keys: default_keys(),
            fetch_all: false,
            request_delay_ms: default_request_delay_ms(),
            filter_text: None,
            artifact_dir: None,
        }
    }
}

/// Output artifact configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Canonical document; holds the previous snapshot between polls
    #[serde(default = "default_document_path")]
    pub document_path: PathBuf,

    /// JSON array of changed table names, written every cycle when set
    #[serde(default)]
    pub changed_tables_path: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            document_path: default_document_path(),
            changed_tables_path: None,
        }
    }
}

/// Notice policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Send informational notices (updates and errors are always sent)
    #[serde(default)]
    pub optional_notices: bool,

    /// Prefix update notices with `@everyone`
    #[serde(default = "default_mention_everyone")]
    pub mention_everyone_on_update: bool,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            optional_notices: false,
            mention_everyone_on_update: default_mention_everyone(),
        }
    }
}

/// Git publish step configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Working tree to commit and push
    pub repo_dir: PathBuf,

    /// Pathspecs passed to `git status` and `git add`
    #[serde(default = "default_publish_paths")]
    pub paths: Vec<String>,

    /// Branch pushed to the remote
    #[serde(default = "default_branch")]
    pub branch: String,

    /// Remote name
    #[serde(default = "default_remote")]
    pub remote: String,
}

impl PublishConfig {
    /// Create a publish configuration with default paths, branch and remote
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            paths: default_publish_paths(),
            branch: default_branch(),
            remote: default_remote(),
        }
    }

    /// Validate the publish configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.repo_dir.as_os_str().is_empty() {
            return Err(crate::Error::config("Publish repository cannot be empty"));
        }
        if self.paths.is_empty() {
            return Err(crate::Error::config("Publish paths cannot be empty"));
        }
        if self.branch.is_empty() || self.remote.is_empty() {
            return Err(crate::Error::config(
                "Publish branch and remote cannot be empty",
            ));
        }
        Ok(())
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Interval between cycles in watch mode (in seconds)
    #[serde(default = "default_watch_interval_secs")]
    pub watch_interval_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            watch_interval_secs: default_watch_interval_secs(),
        }
    }
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_system_path() -> String {
    DEFAULT_SYSTEM_PATH.to_string()
}

fn default_timeout_secs() -> u64 {
    25
}

fn default_user_agent() -> String {
    format!("hotfix-watch/{}", env!("CARGO_PKG_VERSION"))
}

fn default_hotfix_token_names() -> Vec<String> {
    vec!["eg1account_token".to_string(), "account_token".to_string()]
}

fn default_json_token_names() -> Vec<String> {
    vec![
        "eg1account_token".to_string(),
        "account_token".to_string(),
        "client_token".to_string(),
    ]
}

fn default_token_env() -> Option<String> {
    Some("EPIC_ACCOUNT_TOKEN".to_string())
}

fn default_settle_delay_ms() -> u64 {
    1000
}

fn default_keys() -> Vec<String> {
    DEFAULT_KEYS.iter().map(|k| k.to_string()).collect()
}

fn default_request_delay_ms() -> u64 {
    250
}

fn default_document_path() -> PathBuf {
    PathBuf::from("Hotfix.ini")
}

fn default_mention_everyone() -> bool {
    true
}

fn default_publish_paths() -> Vec<String> {
    vec![".".to_string()]
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_remote() -> String {
    "origin".to_string()
}

fn default_watch_interval_secs() -> u64 {
    40
}
