//! Core hotfix engine
//!
//! The HotfixEngine is responsible for:
//! - Obtaining a bearer token and keeping it across cycles
//! - Fetching every key under the single-retry refresh protocol
//! - Aggregating, staging and committing the canonical document
//! - Deriving change events and firing rule groups for changed tables
//! - Announcing results and publishing outputs
//!
//! ## Cycle
//!
//! ```text
//! token ─▶ keys ─▶ fetch (one at a time) ─▶ FetchBatch ─▶ CanonicalDocument
//!                                                               │
//!                                                        stage + commit
//!                                                               │
//!                              ┌──────── Unchanged ◀────────────┤
//!                              │                                ▼
//!                              │                    Changed{tables}
//!                              │                                │
//!                              ▼            events ─▶ rules ─▶ actions ─▶ publish
//!                       changed-tables artifact
//! ```
//!
//! Everything runs sequentially on the caller's task. Diffing always completes
//! before any rule is evaluated.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::actions::{ActionReport, run_actions};
use crate::aggregate::{CanonicalDocument, FetchBatch};
use crate::config::HotfixConfig;
use crate::error::{Error, Result};
use crate::events::parse_events;
use crate::fetch::Fetcher;
use crate::notify::Announcer;
use crate::publish::{GitPublisher, PublishOutcome};
use crate::refresh::{AuthSession, Authorized, Refresher};
use crate::rules::RuleSet;
use crate::snapshot::{DiffOutcome, SnapshotStore, write_changed_tables};
use crate::token::TokenStore;
use crate::traits::{CommandRunner, Notifier, RemoteResponse, RemoteStore, Token};

/// Why a key did not make it into the batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NotFound,
    /// Rejected after the one allowed refresh
    Unauthorized,
    Status {
        status: u16,
        reason: String,
    },
    /// Connect, timeout or body read failure
    Transport(String),
    /// Body did not contain the configured filter text
    Filtered,
}

/// A key left out of the batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedKey {
    pub key: String,
    pub reason: SkipReason,
}

/// Summary of one completed cycle
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    /// Keys attempted
    pub total: usize,
    /// Keys aggregated into the document
    pub fetched: usize,
    pub skipped: Vec<SkippedKey>,
    pub outcome: DiffOutcome,
    pub actions: Vec<ActionReport>,
    /// `None` when no publish step is configured or nothing changed
    pub publish: Option<PublishOutcome>,
}

impl CycleReport {
    pub fn changed_tables(&self) -> &[String] {
        self.outcome.tables()
    }
}

/// Core hotfix engine
///
/// ## Lifecycle
///
/// 1. Create with `HotfixEngine::new()`
/// 2. Call `run_cycle()` once, `run_watch()` to loop, or `run_trigger()` to
///    evaluate rules against the committed document only
///
/// The engine is single-task: every network call and subprocess blocks the
/// pipeline until it completes.
pub struct HotfixEngine {
    fetcher: Fetcher,
    refresher: Refresher,
    snapshots: SnapshotStore,
    rules: Option<RuleSet>,
    runner: Arc<dyn CommandRunner>,
    announcer: Announcer,
    publisher: Option<GitPublisher>,

    keys: Vec<String>,
    fetch_all: bool,
    request_delay: Duration,
    filter_text: Option<String>,
    changed_tables_path: Option<PathBuf>,
    watch_interval: Duration,

    /// Token kept between cycles; `None` until bootstrapped
    token: Option<Token>,
}

impl HotfixEngine {
    /// Create a new engine
    ///
    /// # Parameters
    ///
    /// - `store`: Remote store implementation
    /// - `notifier`: Notice sink
    /// - `runner`: Runs the credential program, rule actions and git
    /// - `rules`: Compiled rule set; `None` disables actions
    /// - `config`: Hotfix configuration
    pub fn new(
        store: Box<dyn RemoteStore>,
        notifier: Box<dyn Notifier>,
        runner: Arc<dyn CommandRunner>,
        rules: Option<RuleSet>,
        config: HotfixConfig,
    ) -> Result<Self> {
        config.validate()?;

        let refresher = Refresher::new(
            TokenStore::from_config(&config.tokens),
            runner.clone(),
            &config.refresh,
        );
        let publisher = config
            .publish
            .map(|publish| GitPublisher::new(publish, runner.clone()));

        Ok(Self {
            fetcher: Fetcher::new(store, config.fetch.artifact_dir),
            refresher,
            snapshots: SnapshotStore::new(config.output.document_path),
            rules,
            runner,
            announcer: Announcer::new(notifier, &config.notify),
            publisher,
            keys: config.fetch.keys,
            fetch_all: config.fetch.fetch_all,
            request_delay: Duration::from_millis(config.fetch.request_delay_ms),
            filter_text: config.fetch.filter_text,
            changed_tables_path: config.output.changed_tables_path,
            watch_interval: Duration::from_secs(config.engine.watch_interval_secs),
            token: None,
        })
    }

    pub fn announcer(&self) -> &Announcer {
        &self.announcer
    }

    /// Run one full poll
    ///
    /// # Errors
    ///
    /// - `Error::TokenUnavailable`: no token before any network call
    /// - `Error::Listing`: key listing failed
    /// - `Error::Unauthorized`: listing, or a key in listing mode, rejected
    ///   after refresh
    /// - IO and snapshot errors from writing outputs
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        let started_at = Utc::now();
        self.announcer.info("Hotfix check started").await;

        let token = match self.token.take() {
            Some(token) => token,
            None => self.bootstrap_token().await?,
        };

        let mut session = AuthSession::new(token, &self.refresher);
        let collected = collect(
            &self.fetcher,
            &mut session,
            &self.keys,
            self.fetch_all,
            self.request_delay,
            self.filter_text.as_deref(),
        )
        .await;
        let token = session.token().clone();
        let (batch, total, skipped) = collected?;
        self.token = Some(token);

        info!(
            "Fetched {}/{} key(s) from {}",
            batch.len(),
            total,
            self.fetcher.store_name()
        );

        let document = CanonicalDocument::from_batch(&batch);
        let staged = self.snapshots.stage(&document).await?;
        let text = staged.text().to_string();
        let outcome = self.snapshots.commit(staged).await?;

        if let Some(path) = &self.changed_tables_path {
            write_changed_tables(path, outcome.tables()).await?;
        }

        let mut report = CycleReport {
            started_at,
            total,
            fetched: batch.len(),
            skipped,
            outcome,
            actions: Vec::new(),
            publish: None,
        };

        let tables = match &report.outcome {
            DiffOutcome::Unchanged => {
                self.announcer
                    .info("No hotfix changes, nothing to update")
                    .await;
                return Ok(report);
            }
            DiffOutcome::Changed { tables } if tables.is_empty() => {
                self.announcer
                    .info("Hotfix changed, but no tracked table differs")
                    .await;
                return Ok(report);
            }
            DiffOutcome::Changed { tables } => tables.clone(),
        };

        self.announcer.update(&tables).await;

        if let Some(rules) = &self.rules {
            let allow: BTreeSet<String> = tables.iter().cloned().collect();
            let events = parse_events(&text);
            let fired = rules.evaluate(&events, Some(&allow));
            if fired.is_empty() {
                info!("No rule group fired");
            }
            report.actions = run_actions(&fired, self.runner.as_ref()).await;
        }

        if let Some(publisher) = &self.publisher {
            let outcome = publisher.publish(&tables).await;
            match &outcome {
                PublishOutcome::Failed { step, stderr } => {
                    self.announcer
                        .error(&format!("git {} failed: {}", step, stderr))
                        .await;
                }
                PublishOutcome::Pushed { message } => {
                    self.announcer.info(&format!("Pushed: {}", message)).await;
                }
                PublishOutcome::NoChanges | PublishOutcome::NothingStaged => {}
            }
            report.publish = Some(outcome);
        }

        Ok(report)
    }

    /// Evaluate rules against the committed document and run the actions
    ///
    /// No network activity. `allow` restricts the tables considered.
    pub async fn run_trigger(&self, allow: Option<&BTreeSet<String>>) -> Result<Vec<ActionReport>> {
        let rules = self
            .rules
            .as_ref()
            .ok_or_else(|| Error::config("Trigger mode requires a rule file"))?;

        let text = self.snapshots.read_current().await?.ok_or_else(|| {
            Error::snapshot(format!(
                "Document not found: {}",
                self.snapshots.path().display()
            ))
        })?;

        let events = parse_events(&text);
        debug!("Parsed {} event(s) from {}", events.len(), self.snapshots.path().display());

        let fired = rules.evaluate(&events, allow);
        if fired.is_empty() {
            info!("No rule group fired");
        }
        Ok(run_actions(&fired, self.runner.as_ref()).await)
    }

    /// Run cycles until Ctrl-C
    ///
    /// A failed cycle is logged and announced; the loop continues.
    pub async fn run_watch(&mut self) -> Result<()> {
        self.run_watch_internal(None).await
    }

    /// Run cycles until `shutdown_rx` fires
    ///
    /// With `None` this behaves like `run_watch()` and stops on Ctrl-C.
    pub async fn run_watch_with_shutdown(
        &mut self,
        shutdown_rx: Option<tokio::sync::oneshot::Receiver<()>>,
    ) -> Result<()> {
        self.run_watch_internal(shutdown_rx).await
    }

    async fn run_watch_internal(
        &mut self,
        mut shutdown_rx: Option<tokio::sync::oneshot::Receiver<()>>,
    ) -> Result<()> {
        info!("Watching every {}s", self.watch_interval.as_secs());

        loop {
            match self.run_cycle().await {
                Ok(report) => debug!(
                    "Cycle finished: {} fetched, {} skipped, {} action(s)",
                    report.fetched,
                    report.skipped.len(),
                    report.actions.len()
                ),
                Err(e) => {
                    error!("Cycle failed: {}", e);
                    self.announcer.error(&format!("Hotfix check failed: {}", e)).await;
                }
            }

            if let Some(rx) = shutdown_rx.as_mut() {
                tokio::select! {
                    _ = tokio::time::sleep(self.watch_interval) => {}
                    _ = rx => {
                        info!("Shutdown signal received");
                        break;
                    }
                }
            } else {
                tokio::select! {
                    _ = tokio::time::sleep(self.watch_interval) => {}
                    _ = tokio::signal::ctrl_c() => {
                        info!("Shutdown signal received");
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    /// Obtain the first token of the run
    ///
    /// Runs the credential program when one is configured, then reads the
    /// sources.
    async fn bootstrap_token(&self) -> Result<Token> {
        self.refresher.refresh().await.ok_or_else(|| {
            error!("No token could be obtained");
            Error::token_unavailable("No token found in any configured source")
        })
    }
}

impl std::fmt::Debug for HotfixEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HotfixEngine")
            .field("store", &self.fetcher.store_name())
            .field("snapshots", &self.snapshots)
            .field("keys", &self.keys.len())
            .field("fetch_all", &self.fetch_all)
            .field("has_token", &self.token.is_some())
            .finish()
    }
}

/// Resolve the key list and fetch every key into a batch
///
/// Returns the batch, the number of keys attempted and the skipped keys.
async fn collect(
    fetcher: &Fetcher,
    session: &mut AuthSession<'_>,
    static_keys: &[String],
    fetch_all: bool,
    request_delay: Duration,
    filter_text: Option<&str>,
) -> Result<(FetchBatch, usize, Vec<SkippedKey>)> {
    let keys = if fetch_all {
        list_keys(fetcher, session).await?
    } else {
        static_keys.to_vec()
    };

    let mut batch = FetchBatch::new();
    let mut skipped = Vec::new();

    for (index, key) in keys.iter().enumerate() {
        if index > 0 && !request_delay.is_zero() {
            tokio::time::sleep(request_delay).await;
        }

        let key = key.as_str();
        let response = session
            .call(key, move |token| async move { fetcher.fetch(&token, key).await })
            .await;

        let reason = match response {
            Ok(Authorized::Response(RemoteResponse::Ok(result))) => {
                match filter_text {
                    Some(filter) if !result.filter_text().contains(filter) => {
                        debug!("{} does not contain the filter text", key);
                        SkipReason::Filtered
                    }
                    _ => {
                        batch.push(key, result);
                        continue;
                    }
                }
            }
            Ok(Authorized::Response(RemoteResponse::NotFound)) => {
                info!("[404] {}: not found", key);
                SkipReason::NotFound
            }
            Ok(Authorized::Response(RemoteResponse::Failed {
                status,
                reason,
                detail,
            })) => {
                warn!(
                    "[{}] {}: {}{}",
                    status,
                    key,
                    reason,
                    detail.map(|d| format!(" ({})", d)).unwrap_or_default()
                );
                SkipReason::Status { status, reason }
            }
            // AuthSession only hands back 401 as Denied
            Ok(Authorized::Response(RemoteResponse::Unauthorized)) | Ok(Authorized::Denied) => {
                if fetch_all {
                    return Err(Error::unauthorized(format!(
                        "{}: rejected after refresh, aborting listing batch",
                        key
                    )));
                }
                error!("[401] {}: rejected after refresh, skipping", key);
                SkipReason::Unauthorized
            }
            Err(Error::Http(msg)) => {
                warn!("{}: request failed: {}", key, msg);
                SkipReason::Transport(msg)
            }
            Err(e) => return Err(e),
        };

        skipped.push(SkippedKey {
            key: key.to_string(),
            reason,
        });
    }

    Ok((batch, keys.len(), skipped))
}

/// Discover keys through the listing call
async fn list_keys(fetcher: &Fetcher, session: &mut AuthSession<'_>) -> Result<Vec<String>> {
    let response = session
        .call("listing", move |token| async move { fetcher.list_keys(&token).await })
        .await
        .map_err(|e| Error::listing(e.to_string()))?;

    match response {
        Authorized::Response(RemoteResponse::Ok(keys)) => {
            info!("Listing returned {} key(s)", keys.len());
            Ok(keys)
        }
        Authorized::Response(RemoteResponse::NotFound) => {
            Err(Error::listing("Listing endpoint returned 404"))
        }
        Authorized::Response(RemoteResponse::Failed {
            status, reason, ..
        }) => Err(Error::listing(format!("[{}] {}", status, reason))),
        Authorized::Response(RemoteResponse::Unauthorized) | Authorized::Denied => {
            Err(Error::unauthorized("Listing rejected after refresh"))
        }
    }
}
