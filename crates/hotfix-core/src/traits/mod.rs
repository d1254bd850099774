//! Core traits for the hotfix pipeline
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`RemoteStore`]: Single-shot GET calls against the remote configuration store
//! - [`TokenSource`]: One persisted location a bearer token can be read from
//! - [`CommandRunner`]: Blocking execution of external programs
//! - [`Notifier`]: Delivery of plain-text notices to a chat sink

pub mod command_runner;
pub mod notifier;
pub mod remote_store;
pub mod token_source;

pub use command_runner::{CommandOutput, CommandRunner};
pub use notifier::{Notice, NoticeKind, Notifier};
pub use remote_store::{RawEntry, RemoteResponse, RemoteStore};
pub use token_source::{Token, TokenSource};
