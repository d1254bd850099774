//! Running external programs
//!
//! [`ProcessRunner`] is the production [`CommandRunner`]; [`run_actions`]
//! executes fired rule groups one after another.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{Error, Result};
use crate::rules::FiredGroup;
use crate::traits::{CommandOutput, CommandRunner};

/// Runs commands as child processes and waits for them to exit
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, argv: &[String], cwd: Option<&Path>) -> Result<CommandOutput> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| Error::command("Empty command line"))?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        let output = cmd
            .output()
            .await
            .map_err(|e| Error::command(format!("Failed to run {}: {}", argv.join(" "), e)))?;

        Ok(CommandOutput {
            // Killed by a signal: no exit code
            code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Outcome of one fired group's action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionReport {
    pub group: String,
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ActionReport {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Run every fired group's command in firing order
///
/// A failing or unspawnable command never stops later ones. Spawn failures
/// are reported with exit code 1 and the error text as stderr.
pub async fn run_actions(fired: &[FiredGroup], runner: &dyn CommandRunner) -> Vec<ActionReport> {
    let mut reports = Vec::with_capacity(fired.len());
    for group in fired {
        tracing::info!("[TRIGGER] {} -> {}", group.name, group.command.join(" "));
        let output = match runner.run(&group.command, None).await {
            Ok(output) => output,
            Err(e) => CommandOutput {
                code: 1,
                stdout: String::new(),
                stderr: e.to_string(),
            },
        };

        if output.success() {
            tracing::info!("[RUN] {} exited with 0", group.name);
        } else {
            tracing::warn!("[RUN] {} exited with {}", group.name, output.code);
        }
        if !output.stdout.is_empty() {
            tracing::info!("{} stdout: {}", group.name, output.stdout.trim_end());
        }
        if !output.stderr.is_empty() {
            tracing::warn!("{} stderr: {}", group.name, output.stderr.trim_end());
        }

        reports.push(ActionReport {
            group: group.name.clone(),
            code: output.code,
            stdout: output.stdout,
            stderr: output.stderr,
        });
    }
    reports
}
