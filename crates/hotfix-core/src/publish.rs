//! Committing and pushing updated outputs with git
//!
//! Steps, each through the [`CommandRunner`] seam and in the configured
//! repository:
//!
//! 1. `git status --porcelain <paths>`: empty output stops here
//! 2. `git add <paths>`
//! 3. `git diff --cached --quiet`: exit 0 (nothing staged) stops here
//! 4. `git commit -m "Hotfix update: <tables>"`
//! 5. `git push <remote> <branch>`

use std::sync::Arc;

use crate::config::PublishConfig;
use crate::traits::{CommandOutput, CommandRunner};

/// Result of one publish attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Working tree clean for the configured paths
    NoChanges,
    /// Files were added but nothing ended up staged
    NothingStaged,
    /// Commit pushed
    Pushed { message: String },
    /// A git step failed
    Failed { step: String, stderr: String },
}

/// Runs the git publish steps
pub struct GitPublisher {
    config: PublishConfig,
    runner: Arc<dyn CommandRunner>,
}

impl GitPublisher {
    pub fn new(config: PublishConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self { config, runner }
    }

    /// Commit message for a set of changed tables
    pub fn commit_message(tables: &[String]) -> String {
        format!("Hotfix update: {}", tables.join(", "))
    }

    /// Commit and push the configured paths
    pub async fn publish(&self, tables: &[String]) -> PublishOutcome {
        let mut status = vec!["status".to_string(), "--porcelain".to_string()];
        status.extend(self.config.paths.iter().cloned());
        let output = match self.git("status", &status).await {
            Ok(output) => output,
            Err(failed) => return failed,
        };
        if output.stdout.trim().is_empty() {
            tracing::info!("No changes to publish in {}", self.config.repo_dir.display());
            return PublishOutcome::NoChanges;
        }

        let mut add = vec!["add".to_string()];
        add.extend(self.config.paths.iter().cloned());
        if let Err(failed) = self.git("add", &add).await {
            return failed;
        }

        // Exit 0 means the index matches HEAD
        let diff = ["diff", "--cached", "--quiet"].map(String::from);
        match self.run(&diff).await {
            Ok(output) if output.success() => {
                tracing::info!("Nothing staged after git add");
                return PublishOutcome::NothingStaged;
            }
            Ok(_) => {}
            Err(failed) => return failed,
        }

        let message = Self::commit_message(tables);
        let commit = vec!["commit".to_string(), "-m".to_string(), message.clone()];
        if let Err(failed) = self.git("commit", &commit).await {
            return failed;
        }
        tracing::info!("Committed: {}", message);

        let push = vec![
            "push".to_string(),
            self.config.remote.clone(),
            self.config.branch.clone(),
        ];
        if let Err(failed) = self.git("push", &push).await {
            return failed;
        }
        tracing::info!(
            "Pushed to {}/{}",
            self.config.remote,
            self.config.branch
        );
        PublishOutcome::Pushed { message }
    }

    /// Run a step that must exit 0
    async fn git(&self, step: &str, args: &[String]) -> Result<CommandOutput, PublishOutcome> {
        let output = self.run(args).await?;
        if output.success() {
            Ok(output)
        } else {
            tracing::error!("git {} failed: {}", step, output.stderr.trim());
            Err(PublishOutcome::Failed {
                step: step.to_string(),
                stderr: output.stderr.trim().to_string(),
            })
        }
    }

    /// Run git with any exit code; only a spawn failure is an error
    async fn run(&self, args: &[String]) -> Result<CommandOutput, PublishOutcome> {
        let mut argv = Vec::with_capacity(args.len() + 1);
        argv.push("git".to_string());
        argv.extend(args.iter().cloned());

        self.runner
            .run(&argv, Some(&self.config.repo_dir))
            .await
            .map_err(|e| {
                tracing::error!("git could not be run: {}", e);
                PublishOutcome::Failed {
                    step: args.first().cloned().unwrap_or_default(),
                    stderr: e.to_string(),
                }
            })
    }
}

impl std::fmt::Debug for GitPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitPublisher")
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::Mutex;

    /// Answers each call with the next scripted output and records argv
    struct ScriptedGit {
        outputs: Mutex<VecDeque<CommandOutput>>,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl ScriptedGit {
        fn new(outputs: Vec<(i32, &str, &str)>) -> Arc<Self> {
            Arc::new(Self {
                outputs: Mutex::new(
                    outputs
                        .into_iter()
                        .map(|(code, stdout, stderr)| CommandOutput {
                            code,
                            stdout: stdout.to_string(),
                            stderr: stderr.to_string(),
                        })
                        .collect(),
                ),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|argv| argv.join(" "))
                .collect()
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedGit {
        async fn run(&self, argv: &[String], cwd: Option<&Path>) -> crate::Result<CommandOutput> {
            assert_eq!(cwd, Some(Path::new("/srv/repo")));
            self.calls.lock().unwrap().push(argv.to_vec());
            self.outputs
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| crate::Error::command("unexpected call"))
        }
    }

    fn publisher(runner: Arc<ScriptedGit>) -> GitPublisher {
        GitPublisher::new(PublishConfig::new("/srv/repo"), runner)
    }

    fn tables() -> Vec<String> {
        vec!["Loot".to_string(), "Spawn".to_string()]
    }

    #[tokio::test]
    async fn test_clean_tree_stops_early() {
        let git = ScriptedGit::new(vec![(0, "", "")]);
        let outcome = publisher(git.clone()).publish(&tables()).await;
        assert_eq!(outcome, PublishOutcome::NoChanges);
        assert_eq!(git.calls(), vec!["git status --porcelain ."]);
    }

    #[tokio::test]
    async fn test_nothing_staged() {
        let git = ScriptedGit::new(vec![(0, " M a.txt\n", ""), (0, "", ""), (0, "", "")]);
        let outcome = publisher(git.clone()).publish(&tables()).await;
        assert_eq!(outcome, PublishOutcome::NothingStaged);
        assert_eq!(git.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_full_publish() {
        let git = ScriptedGit::new(vec![
            (0, " M a.txt\n", ""),
            (0, "", ""),
            (1, "", ""),
            (0, "", ""),
            (0, "", ""),
        ]);
        let outcome = publisher(git.clone()).publish(&tables()).await;
        assert_eq!(
            outcome,
            PublishOutcome::Pushed {
                message: "Hotfix update: Loot, Spawn".to_string()
            }
        );
        assert_eq!(
            git.calls(),
            vec![
                "git status --porcelain .",
                "git add .",
                "git diff --cached --quiet",
                "git commit -m Hotfix update: Loot, Spawn",
                "git push origin main",
            ]
        );
    }

    #[tokio::test]
    async fn test_push_failure_reported() {
        let git = ScriptedGit::new(vec![
            (0, " M a.txt\n", ""),
            (0, "", ""),
            (1, "", ""),
            (0, "", ""),
            (128, "", "rejected\n"),
        ]);
        let outcome = publisher(git).publish(&tables()).await;
        assert_eq!(
            outcome,
            PublishOutcome::Failed {
                step: "push".to_string(),
                stderr: "rejected".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_spawn_failure_reported() {
        let git = ScriptedGit::new(vec![]);
        let outcome = publisher(git).publish(&tables()).await;
        assert!(matches!(
            outcome,
            PublishOutcome::Failed { ref step, .. } if step == "status"
        ));
    }
}
