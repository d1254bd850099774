// # Command Runner Trait
//
// External programs (the credential program, rule actions, git) all run
// through this seam so tests can substitute a recording runner.
//
// Commands block the pipeline until they exit. There is no timeout.

use async_trait::async_trait;
use std::path::Path;

/// Captured result of one external command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `-1` when the process was killed by a signal
    pub code: i32,
    /// Captured stdout, trimmed
    pub stdout: String,
    /// Captured stderr, trimmed
    pub stderr: String,
}

impl CommandOutput {
    /// Whether the command exited with status 0
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Trait for running external commands
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `argv` to completion
    ///
    /// # Parameters
    ///
    /// - `argv`: Program followed by its arguments
    /// - `cwd`: Working directory, or the current one
    ///
    /// # Returns
    ///
    /// - `Ok(CommandOutput)`: The process ran (any exit code)
    /// - `Err(Error)`: The process could not be spawned
    async fn run(&self, argv: &[String], cwd: Option<&Path>)
    -> Result<CommandOutput, crate::Error>;
}
