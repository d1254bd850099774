//! Credential refresh and the single-retry authorization protocol
//!
//! A call that comes back `Unauthorized` gets exactly one refresh-and-retry.
//! The protocol is the state machine
//!
//! ```text
//! Authenticated ──401──▶ Unauthorized ──▶ Refreshing ──token──▶ Authenticated (retried)
//!                                              │                        │
//!                                          no token                    401
//!                                              ▼                        ▼
//!                                            Fatal ◀────────────────────┘
//! ```
//!
//! [`AuthState::next`] is pure, so the at-most-one-retry invariant is testable
//! without any I/O. [`AuthSession::call`] drives it against a real operation.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::RefreshConfig;
use crate::error::Result;
use crate::token::TokenStore;
use crate::traits::{CommandRunner, RemoteResponse, Token};

/// Position in the single-retry protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// Holding a token that has not been rejected yet in this call
    Authenticated {
        /// A refresh already happened during this call
        refreshed: bool,
    },
    /// The store rejected the token; a refresh is allowed
    Unauthorized,
    /// The credential program / token sources are being consulted
    Refreshing,
    /// No further attempts for this call
    Fatal,
}

/// Input to the protocol state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    /// The store answered 401
    Rejected,
    /// A refresh is being started
    RefreshStarted,
    /// The refresh produced a token
    RefreshSucceeded,
    /// The refresh produced no token
    RefreshFailed,
}

impl AuthState {
    /// State at the start of every call
    pub fn start() -> Self {
        AuthState::Authenticated { refreshed: false }
    }

    /// Apply one event
    ///
    /// Transitions not drawn in the module diagram fail closed into `Fatal`.
    pub fn next(self, event: AuthEvent) -> Self {
        match (self, event) {
            (AuthState::Authenticated { refreshed: false }, AuthEvent::Rejected) => {
                AuthState::Unauthorized
            }
            (AuthState::Unauthorized, AuthEvent::RefreshStarted) => AuthState::Refreshing,
            (AuthState::Refreshing, AuthEvent::RefreshSucceeded) => {
                AuthState::Authenticated { refreshed: true }
            }
            _ => AuthState::Fatal,
        }
    }
}

/// Result of an authorized call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authorized<T> {
    /// The store answered with something other than 401
    Response(RemoteResponse<T>),
    /// The store kept rejecting, or no fresh token was available
    Denied,
}

/// Re-acquires tokens, optionally by running the external credential program
pub struct Refresher {
    tokens: TokenStore,
    runner: Arc<dyn CommandRunner>,
    command: Vec<String>,
    settle_delay: Duration,
}

impl Refresher {
    /// Create a refresher
    ///
    /// # Parameters
    ///
    /// - `tokens`: Sources re-read after every refresh
    /// - `runner`: Runs the credential program
    /// - `config`: Credential program argv and settle delay
    pub fn new(tokens: TokenStore, runner: Arc<dyn CommandRunner>, config: &RefreshConfig) -> Self {
        Self {
            tokens,
            runner,
            command: config.command.clone(),
            settle_delay: Duration::from_millis(config.settle_delay_ms),
        }
    }

    /// Read the token sources without running anything
    pub fn resolve(&self) -> Option<Token> {
        self.tokens.resolve()
    }

    /// Obtain a fresh token
    ///
    /// Without a credential program this only re-reads the sources, in case
    /// something refreshed them out of band. With one, the program runs to
    /// completion first; if it cannot be run or exits nonzero the sources are
    /// still re-read.
    pub async fn refresh(&self) -> Option<Token> {
        if self.command.is_empty() {
            info!("No credential program configured, re-reading token sources");
            return self.tokens.resolve();
        }

        info!("Running credential program: {}", self.command[0]);
        match self.runner.run(&self.command, None).await {
            Ok(output) if output.success() => {
                debug!("Credential program finished, settling for {:?}", self.settle_delay);
                tokio::time::sleep(self.settle_delay).await;
            }
            Ok(output) => {
                warn!(
                    "Credential program exited with {}: {}",
                    output.code, output.stderr
                );
                return self.tokens.resolve();
            }
            Err(e) => {
                warn!("Credential program could not be run: {}", e);
                return self.tokens.resolve();
            }
        }

        let token = self.tokens.resolve();
        if token.is_some() {
            info!("Token re-read after credential program");
        } else {
            error!("No token available after credential program");
        }
        token
    }
}

impl std::fmt::Debug for Refresher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Refresher")
            .field("tokens", &self.tokens)
            .field("command", &self.command)
            .field("settle_delay", &self.settle_delay)
            .finish()
    }
}

/// Current token plus the refresher that replaces it on rejection
pub struct AuthSession<'a> {
    token: Token,
    refresher: &'a Refresher,
}

impl<'a> AuthSession<'a> {
    pub fn new(token: Token, refresher: &'a Refresher) -> Self {
        Self { token, refresher }
    }

    /// The token subsequent calls will use
    pub fn token(&self) -> &Token {
        &self.token
    }

    /// Run `op` under the single-retry protocol
    ///
    /// A token obtained by a refresh is kept for later calls on this session.
    ///
    /// # Parameters
    ///
    /// - `what`: Label for log lines (a key, or "listing")
    /// - `op`: The remote call; invoked at most twice
    ///
    /// # Returns
    ///
    /// - `Ok(Authorized::Response)`: The store answered with a non-401 status
    /// - `Ok(Authorized::Denied)`: Rejected after the one allowed refresh
    /// - `Err(Error)`: Transport failure from `op`
    pub async fn call<T, F, Fut>(&mut self, what: &str, mut op: F) -> Result<Authorized<T>>
    where
        F: FnMut(Token) -> Fut,
        Fut: Future<Output = Result<RemoteResponse<T>>>,
    {
        let mut state = AuthState::start();
        loop {
            state = match state {
                AuthState::Authenticated { refreshed } => {
                    let response = op(self.token.clone()).await?;
                    if !response.is_unauthorized() {
                        return Ok(Authorized::Response(response));
                    }
                    if refreshed {
                        error!("[401] {}: rejected again after refresh", what);
                    } else {
                        warn!("[401] {}: token rejected, refreshing", what);
                    }
                    state.next(AuthEvent::Rejected)
                }
                AuthState::Unauthorized => state.next(AuthEvent::RefreshStarted),
                AuthState::Refreshing => match self.refresher.refresh().await {
                    Some(token) => {
                        self.token = token;
                        state.next(AuthEvent::RefreshSucceeded)
                    }
                    None => {
                        error!("[401] {}: no token after refresh", what);
                        state.next(AuthEvent::RefreshFailed)
                    }
                },
                AuthState::Fatal => return Ok(Authorized::Denied),
            };
        }
    }
}
