use std::fmt;
use std::future::Future;
use std::path::PathBuf;

/// Step of a sync cycle, used to say where a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Staging,
    Committing,
    Publishing,
    Pulling,
    Setup,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Staging => "staging",
            Self::Committing => "committing",
            Self::Publishing => "publishing",
            Self::Pulling => "pulling",
            Self::Setup => "setup",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{phase} failed: `{command}` exited with {status}: {stderr}")]
    Command {
        phase: SyncPhase,
        command: String,
        status: String,
        stderr: String,
    },
    #[error("{phase} timed out after {secs}s running `{command}`")]
    Timeout {
        phase: SyncPhase,
        command: String,
        secs: u64,
    },
}

impl SyncError {
    pub fn phase(&self) -> Option<SyncPhase> {
        match self {
            Self::Spawn { .. } => None,
            Self::Command { phase, .. } | Self::Timeout { phase, .. } => Some(*phase),
        }
    }
}

/// Result of one push attempt that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// No tracked file changed since the last commit and the remote has
    /// every local commit.
    NothingToSync,
    Pushed { files: Vec<PathBuf>, message: String },
}

/// Carrier moving the exchange documents between two processes that cannot
/// reach each other directly. `push` publishes local changes, `pull` brings
/// the other side's changes into the local copy.
pub trait Transport: Send + Sync {
    fn push(
        &self,
        files: &[PathBuf],
    ) -> impl Future<Output = Result<PushOutcome, SyncError>> + Send;

    fn pull(&self) -> impl Future<Output = Result<(), SyncError>> + Send;
}
