//! Test doubles and common utilities for pipeline contract tests
//!
//! The doubles record every call so tests can assert on how the engine
//! drives its seams, not only on the final output.

#![allow(dead_code)]

use async_trait::async_trait;
use hotfix_core::config::HotfixConfig;
use hotfix_core::error::{Error, Result};
use hotfix_core::traits::{
    CommandOutput, CommandRunner, Notice, Notifier, RawEntry, RemoteResponse, RemoteStore, Token,
};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// One scripted store answer
#[derive(Clone)]
pub enum Reply {
    Body(&'static str),
    Bytes(Vec<u8>),
    NotFound,
    Unauthorized,
    Status(u16),
    Transport,
}

impl Reply {
    fn into_response(self) -> Result<RemoteResponse<RawEntry>> {
        match self {
            Reply::Body(text) => Ok(RemoteResponse::Ok(RawEntry::new(text.as_bytes(), None))),
            Reply::Bytes(bytes) => Ok(RemoteResponse::Ok(RawEntry::new(bytes, None))),
            Reply::NotFound => Ok(RemoteResponse::NotFound),
            Reply::Unauthorized => Ok(RemoteResponse::Unauthorized),
            Reply::Status(status) => Ok(RemoteResponse::Failed {
                status,
                reason: "Scripted".to_string(),
                detail: None,
            }),
            Reply::Transport => Err(Error::http("connection reset")),
        }
    }
}

/// A RemoteStore answering from per-key scripts
///
/// Each key's replies are consumed in order; the last reply repeats. When an
/// accepted token is set, any other token gets `Unauthorized` regardless of
/// the script.
#[derive(Clone, Default)]
pub struct ScriptedStore {
    scripts: Arc<Mutex<HashMap<String, VecDeque<Reply>>>>,
    listing: Arc<Mutex<VecDeque<Reply>>>,
    listed_keys: Arc<Mutex<Vec<String>>>,
    accepted_token: Arc<Mutex<Option<String>>>,
    fetch_calls: Arc<Mutex<Vec<(String, String)>>>,
    list_calls: Arc<AtomicUsize>,
}

impl ScriptedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the replies for one key
    pub fn script(&self, key: &str, replies: Vec<Reply>) -> &Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(key.to_string(), replies.into());
        self
    }

    /// Script the listing call; `Reply::Body` is ignored in favour of `keys`
    pub fn script_listing(&self, keys: &[&str], replies: Vec<Reply>) -> &Self {
        *self.listed_keys.lock().unwrap() = keys.iter().map(|k| k.to_string()).collect();
        *self.listing.lock().unwrap() = replies.into();
        self
    }

    /// Only accept this bearer token
    pub fn accept_only(&self, token: &str) -> &Self {
        *self.accepted_token.lock().unwrap() = Some(token.to_string());
        self
    }

    /// (key, token) of every fetch call, in order
    pub fn fetch_calls(&self) -> Vec<(String, String)> {
        self.fetch_calls.lock().unwrap().clone()
    }

    pub fn fetch_count(&self, key: &str) -> usize {
        self.fetch_calls()
            .iter()
            .filter(|(k, _)| k == key)
            .count()
    }

    pub fn list_count(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    fn rejects(&self, token: &Token) -> bool {
        match self.accepted_token.lock().unwrap().as_deref() {
            Some(accepted) => accepted != token.expose(),
            None => false,
        }
    }

    fn next_reply(queue: &mut VecDeque<Reply>) -> Option<Reply> {
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl RemoteStore for ScriptedStore {
    async fn fetch(&self, token: &Token, key: &str) -> Result<RemoteResponse<RawEntry>> {
        self.fetch_calls
            .lock()
            .unwrap()
            .push((key.to_string(), token.expose().to_string()));

        if self.rejects(token) {
            return Ok(RemoteResponse::Unauthorized);
        }

        let reply = {
            let mut scripts = self.scripts.lock().unwrap();
            scripts.get_mut(key).and_then(Self::next_reply)
        };
        match reply {
            Some(reply) => reply.into_response(),
            None => Ok(RemoteResponse::NotFound),
        }
    }

    async fn list_keys(&self, token: &Token) -> Result<RemoteResponse<Vec<String>>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);

        if self.rejects(token) {
            return Ok(RemoteResponse::Unauthorized);
        }

        let reply = Self::next_reply(&mut self.listing.lock().unwrap());
        match reply {
            None | Some(Reply::Body(_)) | Some(Reply::Bytes(_)) => {
                Ok(RemoteResponse::Ok(self.listed_keys.lock().unwrap().clone()))
            }
            Some(Reply::NotFound) => Ok(RemoteResponse::NotFound),
            Some(Reply::Unauthorized) => Ok(RemoteResponse::Unauthorized),
            Some(Reply::Status(status)) => Ok(RemoteResponse::Failed {
                status,
                reason: "Scripted".to_string(),
                detail: None,
            }),
            Some(Reply::Transport) => Err(Error::http("connection reset")),
        }
    }

    fn store_name(&self) -> &'static str {
        "scripted"
    }
}

type SideEffect = Arc<dyn Fn(&[String]) + Send + Sync>;

/// A CommandRunner that records argv and exits with a fixed code
#[derive(Clone)]
pub struct RecordingRunner {
    calls: Arc<Mutex<Vec<Vec<String>>>>,
    exit_code: i32,
    side_effect: Option<SideEffect>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            exit_code: 0,
            side_effect: None,
        }
    }

    /// Run `effect` on every call (e.g. to write a token file)
    pub fn with_side_effect(mut self, effect: impl Fn(&[String]) + Send + Sync + 'static) -> Self {
        self.side_effect = Some(Arc::new(effect));
        self
    }

    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }

    /// Every argv, joined with spaces
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|argv| argv.join(" "))
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, argv: &[String], _cwd: Option<&Path>) -> Result<CommandOutput> {
        self.calls.lock().unwrap().push(argv.to_vec());
        if let Some(effect) = &self.side_effect {
            effect(argv);
        }
        Ok(CommandOutput {
            code: self.exit_code,
            stdout: String::new(),
            stderr: String::new(),
        })
    }
}

/// A Notifier that keeps every delivered notice
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<Notice>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notice> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn deliver(&self, notice: &Notice) -> Result<()> {
        self.sent.lock().unwrap().push(notice.clone());
        Ok(())
    }

    fn notifier_name(&self) -> &'static str {
        "recording"
    }
}

/// Paths used by [`test_config`]
pub struct TestPaths {
    pub document: PathBuf,
    pub changed_tables: PathBuf,
    pub artifacts: PathBuf,
    pub tokens_json: PathBuf,
}

impl TestPaths {
    pub fn new(dir: &Path) -> Self {
        Self {
            document: dir.join("Hotfix.ini"),
            changed_tables: dir.join("changed_tables.json"),
            artifacts: dir.join("cloudstorage_system"),
            tokens_json: dir.join("tokens.json"),
        }
    }

    /// Write `{"client_token": token}` to the JSON token file
    pub fn write_token(&self, token: &str) {
        std::fs::write(
            &self.tokens_json,
            format!(r#"{{"client_token": "{}"}}"#, token),
        )
        .unwrap();
    }
}

/// Configuration rooted in a temp dir: no delays, JSON token file only
pub fn test_config(paths: &TestPaths, keys: &[&str]) -> HotfixConfig {
    let mut config = HotfixConfig::default();
    config.fetch.keys = keys.iter().map(|k| k.to_string()).collect();
    config.fetch.request_delay_ms = 0;
    config.fetch.artifact_dir = Some(paths.artifacts.clone());
    config.output.document_path = paths.document.clone();
    config.output.changed_tables_path = Some(paths.changed_tables.clone());
    config.tokens.hotfix_file = None;
    config.tokens.json_file = Some(paths.tokens_json.clone());
    config.tokens.env_var = None;
    config.refresh.settle_delay_ms = 0;
    config.engine.watch_interval_secs = 1;
    config
}
