use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;

use tokio::process::Command;

use arthvidya_core::time::commit_stamp;

use crate::config::SyncConfig;
use crate::transport::{PushOutcome, SyncError, SyncPhase, Transport};

/// Transport that commits the documents into a git working copy and pushes
/// them to a remote branch.
#[derive(Debug, Clone)]
pub struct GitTransport {
    git: String,
    repo_dir: PathBuf,
    remote: String,
    branch: String,
    timeout: Option<Duration>,
}

impl GitTransport {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            git: config.git_binary.clone(),
            repo_dir: config.repo_dir.clone(),
            remote: config.remote.clone(),
            branch: config.branch.clone(),
            timeout: config.command_timeout(),
        }
    }

    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    /// `git --version`; fails if the binary cannot be run.
    pub async fn version(&self) -> Result<String, SyncError> {
        let out = self.run(SyncPhase::Setup, &["--version"]).await?;
        Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
    }

    /// Initialize a repository in `repo_dir` unless it already is one.
    /// Returns true if a new repository was created.
    pub async fn ensure_repo(&self) -> Result<bool, SyncError> {
        let inside = self
            .output(SyncPhase::Setup, &["rev-parse", "--is-inside-work-tree"])
            .await?;
        if inside.status.success() {
            return Ok(false);
        }
        tracing::info!(dir = %self.repo_dir.display(), "Initializing git repository");
        self.run(SyncPhase::Setup, &["init"]).await?;
        let head = format!("refs/heads/{}", self.branch);
        self.run(SyncPhase::Setup, &["symbolic-ref", "HEAD", &head])
            .await?;
        Ok(true)
    }

    /// Point the configured remote at `url`, adding it if it does not exist.
    pub async fn set_remote(&self, url: &str) -> Result<(), SyncError> {
        let added = self
            .output(SyncPhase::Setup, &["remote", "add", &self.remote, url])
            .await?;
        if added.status.success() {
            tracing::info!(remote = %self.remote, url, "Added git remote");
            return Ok(());
        }
        self.run(SyncPhase::Setup, &["remote", "set-url", &self.remote, url])
            .await?;
        tracing::info!(remote = %self.remote, url, "Updated git remote");
        Ok(())
    }

    /// Porcelain status of the working copy.
    pub async fn status(&self) -> Result<String, SyncError> {
        let out = self.run(SyncPhase::Setup, &["status", "--porcelain"]).await?;
        Ok(String::from_utf8_lossy(&out.stdout).into_owned())
    }

    /// Stage the files that exist on disk and return them.
    pub async fn stage_existing(&self, files: &[PathBuf]) -> Result<Vec<PathBuf>, SyncError> {
        let mut staged = Vec::new();
        for file in files {
            if !self.resolve(file).exists() {
                tracing::debug!(file = %file.display(), "Skipping missing file");
                continue;
            }
            let path = file.to_string_lossy();
            self.run(SyncPhase::Staging, &["add", "--", &path]).await?;
            staged.push(file.clone());
        }
        Ok(staged)
    }

    /// Whether the index differs from HEAD for any of `files`.
    pub async fn has_staged_changes(&self, files: &[PathBuf]) -> Result<bool, SyncError> {
        let mut args = vec!["diff", "--cached", "--quiet", "--"];
        let paths: Vec<String> = files
            .iter()
            .map(|f| f.to_string_lossy().into_owned())
            .collect();
        args.extend(paths.iter().map(String::as_str));
        let out = self.output(SyncPhase::Staging, &args).await?;
        match out.status.code() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(command_failed(SyncPhase::Staging, &self.git, &args, &out)),
        }
    }

    /// Whether HEAD holds commits the remote branch has not received, for
    /// example after a failed push. A missing remote-tracking ref counts as
    /// unpublished as soon as HEAD exists.
    pub async fn has_unpublished_commits(&self) -> Result<bool, SyncError> {
        let head = self
            .output(SyncPhase::Publishing, &["rev-parse", "--verify", "--quiet", "HEAD"])
            .await?;
        if !head.status.success() {
            return Ok(false);
        }

        let upstream = format!("refs/remotes/{}/{}", self.remote, self.branch);
        let tracking = self
            .output(SyncPhase::Publishing, &["rev-parse", "--verify", "--quiet", &upstream])
            .await?;
        if !tracking.status.success() {
            return Ok(true);
        }

        let range = format!("{upstream}..HEAD");
        let out = self
            .run(SyncPhase::Publishing, &["rev-list", "--count", &range])
            .await?;
        let ahead = String::from_utf8_lossy(&out.stdout)
            .trim()
            .parse::<u64>()
            .unwrap_or(1);
        Ok(ahead > 0)
    }

    /// Subject line of the HEAD commit.
    pub async fn head_subject(&self) -> Result<String, SyncError> {
        let out = self
            .run(SyncPhase::Publishing, &["log", "-1", "--format=%s"])
            .await?;
        Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
    }

    pub async fn commit(&self, message: &str) -> Result<(), SyncError> {
        self.run(SyncPhase::Committing, &["commit", "-m", message])
            .await?;
        Ok(())
    }

    pub async fn push_branch(&self) -> Result<(), SyncError> {
        self.run(SyncPhase::Publishing, &["push", &self.remote, &self.branch])
            .await?;
        Ok(())
    }

    fn resolve(&self, file: &Path) -> PathBuf {
        if file.is_absolute() {
            file.to_path_buf()
        } else {
            self.repo_dir.join(file)
        }
    }

    /// Run git and require a zero exit status.
    async fn run(&self, phase: SyncPhase, args: &[&str]) -> Result<Output, SyncError> {
        let out = self.output(phase, args).await?;
        if out.status.success() {
            Ok(out)
        } else {
            Err(command_failed(phase, &self.git, args, &out))
        }
    }

    /// Run git and return its output whatever the exit status.
    async fn output(&self, phase: SyncPhase, args: &[&str]) -> Result<Output, SyncError> {
        let mut cmd = Command::new(&self.git);
        cmd.args(args)
            .current_dir(&self.repo_dir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .kill_on_drop(true);

        let spawn_err = |source| SyncError::Spawn {
            program: self.git.clone(),
            source,
        };

        match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, cmd.output()).await {
                Ok(result) => result.map_err(spawn_err),
                Err(_) => Err(SyncError::Timeout {
                    phase,
                    command: render(&self.git, args),
                    secs: limit.as_secs(),
                }),
            },
            None => cmd.output().await.map_err(spawn_err),
        }
    }
}

fn render(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}

fn command_failed(phase: SyncPhase, program: &str, args: &[&str], out: &Output) -> SyncError {
    SyncError::Command {
        phase,
        command: render(program, args),
        status: out.status.to_string(),
        stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
    }
}

impl Transport for GitTransport {
    async fn push(&self, files: &[PathBuf]) -> Result<PushOutcome, SyncError> {
        let staged = self.stage_existing(files).await?;
        let changed = !staged.is_empty() && self.has_staged_changes(&staged).await?;

        let message = if changed {
            let message = format!("Auto-sync game state - {}", commit_stamp());
            self.commit(&message).await?;
            message
        } else if self.has_unpublished_commits().await? {
            tracing::info!(remote = %self.remote, branch = %self.branch, "Retrying push of unpublished commits");
            self.head_subject().await?
        } else {
            tracing::debug!(files = staged.len(), "Tracked files unchanged, nothing to sync");
            return Ok(PushOutcome::NothingToSync);
        };
        self.push_branch().await?;

        tracing::info!(files = staged.len(), remote = %self.remote, branch = %self.branch, "Pushed game state");
        Ok(PushOutcome::Pushed {
            files: staged,
            message,
        })
    }

    async fn pull(&self) -> Result<(), SyncError> {
        self.run(SyncPhase::Pulling, &["pull", &self.remote, &self.branch])
            .await?;
        tracing::info!(remote = %self.remote, branch = %self.branch, "Pulled latest game state");
        Ok(())
    }
}
