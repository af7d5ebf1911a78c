use std::path::{Path, PathBuf};
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use arthvidya_core::DocumentKind;
use arthvidya_core::time::timestamp_now;

use crate::config::SyncConfig;
use crate::transport::{PushOutcome, SyncError, Transport};

/// How one push cycle ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum CycleOutcome {
    NothingToSync,
    Pushed { files: usize },
    Failed { error: String },
}

impl CycleOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Snapshot published after every cycle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncStatus {
    pub cycles: u64,
    pub pushes: u64,
    pub consecutive_failures: u32,
    pub last_outcome: Option<CycleOutcome>,
    pub last_push_at: Option<String>,
    pub stopped: bool,
}

/// Absolute paths of the three exchange documents under `data_dir`.
pub fn tracked_files(data_dir: &Path) -> Vec<PathBuf> {
    DocumentKind::ALL
        .iter()
        .map(|doc| {
            let path = data_dir.join(doc.file_name());
            std::path::absolute(&path).unwrap_or(path)
        })
        .collect()
}

/// Periodic push loop over a [`Transport`].
pub struct SyncLoop<T> {
    transport: T,
    files: Vec<PathBuf>,
    interval: Duration,
    backoff: ExponentialBackoff,
    status: SyncStatus,
    status_tx: watch::Sender<SyncStatus>,
}

impl<T: Transport> SyncLoop<T> {
    pub fn new(transport: T, files: Vec<PathBuf>, config: &SyncConfig) -> Self {
        Self::with_timing(transport, files, config.interval(), config.max_backoff())
    }

    pub fn with_timing(
        transport: T,
        files: Vec<PathBuf>,
        interval: Duration,
        max_backoff: Duration,
    ) -> Self {
        let backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(interval)
            .with_max_interval(max_backoff.max(interval))
            .with_multiplier(2.0)
            .with_randomization_factor(0.0)
            .with_max_elapsed_time(None)
            .build();
        let (status_tx, _) = watch::channel(SyncStatus::default());
        Self {
            transport,
            files,
            interval,
            backoff,
            status: SyncStatus::default(),
            status_tx,
        }
    }

    /// Receiver that observes the status after every cycle.
    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.status_tx.subscribe()
    }

    pub fn status(&self) -> &SyncStatus {
        &self.status
    }

    /// Stage, commit and publish once.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let outcome = match self.transport.push(&self.files).await {
            Ok(PushOutcome::NothingToSync) => CycleOutcome::NothingToSync,
            Ok(PushOutcome::Pushed { files, message }) => {
                tracing::debug!(%message, "Sync cycle committed");
                CycleOutcome::Pushed { files: files.len() }
            },
            Err(e) => {
                tracing::warn!(phase = ?e.phase(), error = %e, "Sync cycle failed");
                CycleOutcome::Failed {
                    error: e.to_string(),
                }
            },
        };
        self.record(&outcome);
        outcome
    }

    /// Delay before the next cycle. Failures walk the backoff; anything else
    /// resets it and waits the plain interval.
    pub fn next_delay(&mut self, outcome: &CycleOutcome) -> Duration {
        if outcome.is_failure() {
            self.backoff
                .next_backoff()
                .unwrap_or(self.backoff.max_interval)
        } else {
            self.backoff.reset();
            self.interval
        }
    }

    /// Run cycles until `cancel` fires. A cycle already running is allowed
    /// to finish so git never leaves a stale index lock behind.
    pub async fn run(mut self, cancel: CancellationToken) -> SyncStatus {
        tracing::info!(
            files = self.files.len(),
            interval_secs = self.interval.as_secs(),
            "Sync loop started"
        );
        while !cancel.is_cancelled() {
            let outcome = self.run_cycle().await;
            let delay = self.next_delay(&outcome);
            if outcome.is_failure() {
                tracing::info!(
                    retry_in = ?delay,
                    failures = self.status.consecutive_failures,
                    "Retrying sync after backoff"
                );
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {},
            }
        }
        self.status.stopped = true;
        self.status_tx.send_replace(self.status.clone());
        tracing::info!(cycles = self.status.cycles, pushes = self.status.pushes, "Sync loop stopped");
        self.status
    }

    fn record(&mut self, outcome: &CycleOutcome) {
        self.status.cycles += 1;
        match outcome {
            CycleOutcome::Pushed { .. } => {
                self.status.pushes += 1;
                self.status.consecutive_failures = 0;
                self.status.last_push_at = Some(timestamp_now());
            },
            CycleOutcome::NothingToSync => self.status.consecutive_failures = 0,
            CycleOutcome::Failed { .. } => self.status.consecutive_failures += 1,
        }
        self.status.last_outcome = Some(outcome.clone());
        self.status_tx.send_replace(self.status.clone());
    }
}

/// Bring the other side's changes into the local copy.
pub async fn pull<T: Transport>(transport: &T) -> Result<(), SyncError> {
    transport.pull().await
}
