// # hotfix-core
//
// Core library for the hotfix watcher.
//
// ## Architecture Overview
//
// This library polls a remote configuration store, snapshots what it finds and
// reacts to table-level changes:
// - **RemoteStore**: Trait for single-shot reads from the remote store
// - **TokenSource** / **TokenStore**: Bearer token resolution from persisted sources
// - **Refresher** / **AuthSession**: One refresh-and-retry per rejected call
// - **CanonicalDocument**: Deterministic aggregation of one poll
// - **SnapshotStore**: Atomic stage/commit of the document with table diffing
// - **RuleSet**: Rule groups and cross-triggers over change events
// - **HotfixEngine**: Orchestrates a cycle end to end
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Transport and notification sinks live in
//    plugin crates; policy lives here
// 2. **Sequential**: One request, one subprocess at a time
// 3. **Explicit outcomes**: Per-key statuses are values, not errors
// 4. **Library-First**: All core functionality can be used as a library

pub mod actions;
pub mod aggregate;
pub mod config;
pub mod diff;
pub mod engine;
pub mod error;
pub mod events;
pub mod fetch;
pub mod notify;
pub mod publish;
pub mod refresh;
pub mod rules;
pub mod snapshot;
pub mod token;
pub mod traits;

// Re-export core types for convenience
pub use actions::{ActionReport, ProcessRunner, run_actions};
pub use aggregate::{CanonicalDocument, FetchBatch};
pub use config::HotfixConfig;
pub use engine::{CycleReport, HotfixEngine, SkipReason, SkippedKey};
pub use error::{Error, Result};
pub use events::{ChangeEvent, parse_events};
pub use fetch::{FetchResult, Fetcher};
pub use notify::{Announcer, LogNotifier};
pub use publish::{GitPublisher, PublishOutcome};
pub use rules::{FiredGroup, RuleSet};
pub use snapshot::{DiffOutcome, SnapshotStore};
pub use token::TokenStore;
pub use traits::{CommandRunner, Notifier, RemoteStore, TokenSource};
