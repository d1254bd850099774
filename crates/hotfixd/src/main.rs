// # hotfixd - Hotfix Daemon
//
// Thin integration layer: all fetch, diff and rule logic lives in hotfix-core.
//
// The hotfixd daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Wiring the cloud storage store, notifier and process runner
// 4. Running one cycle, the watch loop, or trigger-only mode
// 5. Mapping the outcome to a process exit code
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### Mode
// - `HOTFIX_MODE`: `once` (default), `watch`, `trigger`
//
// ### Remote
// - `HOTFIX_HOST`: Remote host
// - `HOTFIX_KEYS`: Comma-separated keys to fetch
// - `HOTFIX_FETCH_ALL`: Discover keys through the listing endpoint
// - `HOTFIX_REQUEST_DELAY_MS`: Delay between requests
// - `HOTFIX_HTTP_TIMEOUT_SECS`: Request timeout
// - `HOTFIX_FILTER_TEXT`: Keep only bodies containing this text
//
// ### Outputs
// - `HOTFIX_ARTIFACT_DIR`: Per-key artifacts (empty disables)
// - `HOTFIX_DOCUMENT_PATH`: Canonical document
// - `HOTFIX_CHANGED_TABLES_PATH`: Changed-tables JSON list
//
// ### Credentials
// - `HOTFIX_TOKEN_HOTFIX_FILE`, `HOTFIX_TOKEN_JSON_FILE`: Token files
// - `HOTFIX_TOKEN_ENV`: Name of the variable holding a token
// - `HOTFIX_REFRESH_CMD`: Credential program, whitespace-separated
// - `HOTFIX_REFRESH_SETTLE_MS`: Wait after the program succeeds
//
// ### Rules
// - `HOTFIX_RULES_PATH`: YAML rule file (required for `trigger`)
// - `HOTFIX_ONLY_TABLES`: Comma-separated allow-list for `trigger`
//
// ### Notices and publishing
// - `HOTFIX_WEBHOOK_URL`: Chat webhook (notices are only logged without it)
// - `HOTFIX_OPTIONAL_NOTICES`, `HOTFIX_MENTION_EVERYONE`: Notice flags
// - `HOTFIX_GIT_REPO`, `HOTFIX_GIT_BRANCH`, `HOTFIX_GIT_PATHS`: Publish step
//
// ### Engine
// - `HOTFIX_WATCH_INTERVAL_SECS`: Seconds between cycles in `watch`
// - `HOTFIX_LOG_LEVEL`: trace, debug, info, warn, error
//
// ## Example
//
// ```bash
// export HOTFIX_TOKEN_JSON_FILE=/var/lib/hotfix/tokens.json
// export HOTFIX_REFRESH_CMD="python3 get_token.py"
// export HOTFIX_RULES_PATH=/etc/hotfix/rules.yaml
// export HOTFIX_WEBHOOK_URL=https://chat.example.com/api/webhooks/...
// export HOTFIX_MODE=watch
//
// hotfixd
// ```

use anyhow::{Context, Result};
use hotfix_core::config::{HotfixConfig, PublishConfig};
use hotfix_core::traits::Notifier;
use hotfix_core::{DiffOutcome, Error, HotfixEngine, LogNotifier, ProcessRunner, RuleSet};
use hotfix_store_http::CloudStorageStore;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// A supervisor loop relies on `Unchanged` to skip its follow-up steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HotfixExitCode {
    /// Normal completion, with or without changes
    Success = 0,
    /// Environment or rule file error
    ConfigError = 1,
    /// IO or unexpected failure
    RuntimeError = 2,
    /// No token obtainable
    TokenUnavailable = 10,
    /// Key listing failed
    ListingFailed = 11,
    /// Rejected after refresh in fetch-all mode
    Unauthorized = 12,
    /// No change, nothing else executed
    Unchanged = 100,
}

impl From<HotfixExitCode> for ExitCode {
    fn from(code: HotfixExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

impl From<&Error> for HotfixExitCode {
    fn from(error: &Error) -> Self {
        match error {
            Error::Config(_) | Error::Yaml(_) | Error::Regex(_) => HotfixExitCode::ConfigError,
            Error::TokenUnavailable(_) => HotfixExitCode::TokenUnavailable,
            Error::Listing(_) => HotfixExitCode::ListingFailed,
            Error::Unauthorized(_) => HotfixExitCode::Unauthorized,
            _ => HotfixExitCode::RuntimeError,
        }
    }
}

/// What the daemon does once wired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Once,
    Watch,
    Trigger,
}

impl Mode {
    fn parse(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "once" => Ok(Mode::Once),
            "watch" => Ok(Mode::Watch),
            "trigger" => Ok(Mode::Trigger),
            other => anyhow::bail!(
                "HOTFIX_MODE '{}' is not supported. Supported modes: once, watch, trigger",
                other
            ),
        }
    }
}

/// Application configuration
#[derive(Debug)]
struct Config {
    mode: Mode,
    host: Option<String>,
    keys: Option<Vec<String>>,
    fetch_all: bool,
    request_delay_ms: Option<u64>,
    http_timeout_secs: Option<u64>,
    filter_text: Option<String>,
    artifact_dir: Option<PathBuf>,
    document_path: Option<PathBuf>,
    changed_tables_path: Option<PathBuf>,
    token_hotfix_file: Option<PathBuf>,
    token_json_file: Option<PathBuf>,
    token_env: Option<String>,
    refresh_cmd: Vec<String>,
    refresh_settle_ms: Option<u64>,
    rules_path: Option<PathBuf>,
    only_tables: Option<Vec<String>>,
    webhook_url: Option<String>,
    optional_notices: bool,
    mention_everyone: bool,
    git_repo: Option<PathBuf>,
    git_branch: Option<String>,
    git_paths: Option<Vec<String>>,
    watch_interval_secs: Option<u64>,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup`; empty values count as unset
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let number = |name: &str| -> Result<Option<u64>> {
            var(name)
                .map(|v| {
                    v.trim()
                        .parse::<u64>()
                        .with_context(|| format!("{} must be a non-negative integer, got '{}'", name, v))
                })
                .transpose()
        };
        let flag = |name: &str, default: bool| -> Result<bool> {
            match var(name) {
                None => Ok(default),
                Some(v) => parse_bool(&v).with_context(|| format!("Invalid {}", name)),
            }
        };

        Ok(Self {
            mode: var("HOTFIX_MODE")
                .map(|v| Mode::parse(&v))
                .transpose()?
                .unwrap_or(Mode::Once),
            host: var("HOTFIX_HOST"),
            keys: var("HOTFIX_KEYS").map(|v| split_list(&v)),
            fetch_all: flag("HOTFIX_FETCH_ALL", false)?,
            request_delay_ms: number("HOTFIX_REQUEST_DELAY_MS")?,
            http_timeout_secs: number("HOTFIX_HTTP_TIMEOUT_SECS")?,
            filter_text: var("HOTFIX_FILTER_TEXT"),
            // Set but empty disables artifacts
            artifact_dir: match lookup("HOTFIX_ARTIFACT_DIR") {
                None => Some(PathBuf::from("cloudstorage_system")),
                Some(v) if v.trim().is_empty() => None,
                Some(v) => Some(PathBuf::from(v)),
            },
            document_path: var("HOTFIX_DOCUMENT_PATH").map(PathBuf::from),
            changed_tables_path: var("HOTFIX_CHANGED_TABLES_PATH").map(PathBuf::from),
            token_hotfix_file: var("HOTFIX_TOKEN_HOTFIX_FILE").map(PathBuf::from),
            token_json_file: var("HOTFIX_TOKEN_JSON_FILE").map(PathBuf::from),
            token_env: var("HOTFIX_TOKEN_ENV"),
            refresh_cmd: var("HOTFIX_REFRESH_CMD")
                .map(|v| v.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            refresh_settle_ms: number("HOTFIX_REFRESH_SETTLE_MS")?,
            rules_path: var("HOTFIX_RULES_PATH").map(PathBuf::from),
            only_tables: var("HOTFIX_ONLY_TABLES").map(|v| split_list(&v)),
            webhook_url: var("HOTFIX_WEBHOOK_URL"),
            optional_notices: flag("HOTFIX_OPTIONAL_NOTICES", false)?,
            mention_everyone: flag("HOTFIX_MENTION_EVERYONE", true)?,
            git_repo: var("HOTFIX_GIT_REPO").map(PathBuf::from),
            git_branch: var("HOTFIX_GIT_BRANCH"),
            git_paths: var("HOTFIX_GIT_PATHS").map(|v| split_list(&v)),
            watch_interval_secs: number("HOTFIX_WATCH_INTERVAL_SECS")?,
            log_level: var("HOTFIX_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the configuration
    ///
    /// Everything that can fail before the first request fails here.
    fn validate(&self) -> Result<()> {
        if self.mode == Mode::Trigger && self.rules_path.is_none() {
            anyhow::bail!(
                "HOTFIX_RULES_PATH is required when HOTFIX_MODE=trigger. \
                Set it via: export HOTFIX_RULES_PATH=/etc/hotfix/rules.yaml"
            );
        }

        if self.only_tables.is_some() && self.mode != Mode::Trigger {
            warn!("HOTFIX_ONLY_TABLES only applies to HOTFIX_MODE=trigger; ignoring it");
        }

        if let Some(url) = &self.webhook_url
            && !url.starts_with("https://")
            && !url.starts_with("http://")
        {
            anyhow::bail!("HOTFIX_WEBHOOK_URL must use HTTP or HTTPS scheme");
        }

        if let Some(interval) = self.watch_interval_secs
            && !(1..=86_400).contains(&interval)
        {
            anyhow::bail!(
                "HOTFIX_WATCH_INTERVAL_SECS must be between 1 and 86400 seconds. Got: {}",
                interval
            );
        }

        if let Some(repo) = &self.git_repo
            && !repo.is_dir()
        {
            anyhow::bail!(
                "HOTFIX_GIT_REPO is not a directory: {}",
                repo.display()
            );
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "HOTFIX_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        self.to_hotfix_config()
            .validate()
            .context("Invalid hotfix configuration")
    }

    /// Build the core configuration, keeping core defaults for unset values
    fn to_hotfix_config(&self) -> HotfixConfig {
        let mut config = HotfixConfig::new();

        if let Some(host) = &self.host {
            config.remote.host = host.clone();
        }
        if let Some(timeout) = self.http_timeout_secs {
            config.remote.timeout_secs = timeout;
        }

        if let Some(path) = &self.token_hotfix_file {
            config.tokens.hotfix_file = Some(path.clone());
        }
        if let Some(path) = &self.token_json_file {
            config.tokens.json_file = Some(path.clone());
        }
        if let Some(name) = &self.token_env {
            config.tokens.env_var = Some(name.clone());
        }

        config.refresh.command = self.refresh_cmd.clone();
        if let Some(settle) = self.refresh_settle_ms {
            config.refresh.settle_delay_ms = settle;
        }

        if let Some(keys) = &self.keys {
            config.fetch.keys = keys.clone();
        }
        config.fetch.fetch_all = self.fetch_all;
        if let Some(delay) = self.request_delay_ms {
            config.fetch.request_delay_ms = delay;
        }
        config.fetch.filter_text = self.filter_text.clone();
        config.fetch.artifact_dir = self.artifact_dir.clone();

        if let Some(path) = &self.document_path {
            config.output.document_path = path.clone();
        }
        config.output.changed_tables_path = self.changed_tables_path.clone();

        config.notify.optional_notices = self.optional_notices;
        config.notify.mention_everyone_on_update = self.mention_everyone;

        config.publish = self.git_repo.as_ref().map(|repo| {
            let mut publish = PublishConfig::new(repo);
            if let Some(branch) = &self.git_branch {
                publish.branch = branch.clone();
            }
            if let Some(paths) = &self.git_paths {
                publish.paths = paths.clone();
            }
            publish
        });

        if let Some(interval) = self.watch_interval_secs {
            config.engine.watch_interval_secs = interval;
        }

        config
    }
}

/// Split a comma-separated list, dropping blanks
fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("expected true or false, got '{}'", other),
    }
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return HotfixExitCode::ConfigError.into();
        }
    };

    // Initialize tracing
    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return HotfixExitCode::ConfigError.into();
    }

    // Validate configuration
    if let Err(e) = config.validate() {
        error!("Configuration validation error: {:#}", e);
        return HotfixExitCode::ConfigError.into();
    }

    let rules = match &config.rules_path {
        Some(path) => match RuleSet::load(path) {
            Ok(rules) => Some(rules),
            Err(e) => {
                error!("Rule file error: {}", e);
                return HotfixExitCode::ConfigError.into();
            }
        },
        None => None,
    };

    info!("Starting hotfixd in {:?} mode", config.mode);

    // Enter tokio runtime
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return HotfixExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        match run_daemon(config, rules).await {
            Ok(code) => code,
            Err(e) => {
                error!("Daemon error: {}", e);
                HotfixExitCode::from(&e)
            }
        }
    });

    result.into()
}

/// Run the daemon in the configured mode
async fn run_daemon(config: Config, rules: Option<RuleSet>) -> Result<HotfixExitCode, Error> {
    let hotfix_config = config.to_hotfix_config();

    let store = CloudStorageStore::new(&hotfix_config.remote)?;
    info!("Remote store: {:?}", store);

    let notifier = build_notifier(&config)?;
    info!("Notifier: {}", notifier.notifier_name());

    let mut engine = HotfixEngine::new(
        Box::new(store),
        notifier,
        Arc::new(ProcessRunner::new()),
        rules,
        hotfix_config,
    )?;

    match config.mode {
        Mode::Once => match engine.run_cycle().await {
            Ok(report) => {
                info!(
                    "Cycle finished: {}/{} key(s) fetched, {} skipped",
                    report.fetched,
                    report.total,
                    report.skipped.len()
                );
                for action in report.actions.iter().filter(|a| !a.success()) {
                    warn!("Action '{}' exited with {}", action.group, action.code);
                }
                if report.outcome == DiffOutcome::Unchanged {
                    Ok(HotfixExitCode::Unchanged)
                } else {
                    Ok(HotfixExitCode::Success)
                }
            }
            Err(e) => {
                engine
                    .announcer()
                    .error(&format!("Hotfix check failed: {}", e))
                    .await;
                Err(e)
            }
        },
        Mode::Watch => {
            let shutdown_rx = shutdown_channel()?;
            engine.run_watch_with_shutdown(Some(shutdown_rx)).await?;
            info!("Shutting down daemon");
            Ok(HotfixExitCode::Success)
        }
        Mode::Trigger => {
            let allow: Option<BTreeSet<String>> = config
                .only_tables
                .map(|tables| tables.into_iter().collect());
            let reports = engine.run_trigger(allow.as_ref()).await?;
            for report in &reports {
                if report.success() {
                    info!("Action '{}' completed", report.group);
                } else {
                    warn!("Action '{}' exited with {}", report.group, report.code);
                }
            }
            Ok(HotfixExitCode::Success)
        }
    }
}

/// Pick the notice sink
fn build_notifier(config: &Config) -> Result<Box<dyn Notifier>, Error> {
    #[cfg(feature = "webhook")]
    {
        if let Some(url) = &config.webhook_url {
            let notifier = hotfix_notify_webhook::WebhookNotifier::new(url.clone())?;
            return Ok(Box::new(notifier));
        }
    }

    #[cfg(not(feature = "webhook"))]
    {
        if config.webhook_url.is_some() {
            warn!("Built without the webhook feature; notices are only logged");
        }
    }

    Ok(Box::new(LogNotifier))
}

/// Resolve once SIGTERM or SIGINT arrives
#[cfg(unix)]
fn shutdown_channel() -> Result<oneshot::Receiver<()>, Error> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let name = tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
        };
        info!("Received shutdown signal: {}", name);
        let _ = tx.send(());
    });

    Ok(rx)
}

/// Resolve once Ctrl-C arrives
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
fn shutdown_channel() -> Result<oneshot::Receiver<()>, Error> {
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal: SIGINT");
            let _ = tx.send(());
        }
    });

    Ok(rx)
}
