use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Configuration for the git sync transport and its push loop.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Run the periodic push loop (dashboard only; the CLI ignores this).
    pub enabled: bool,
    /// Working copy the documents are committed in.
    pub repo_dir: PathBuf,
    pub remote: String,
    pub branch: String,
    /// Git executable, looked up on `PATH` unless absolute.
    pub git_binary: String,
    /// Pause between push cycles.
    pub interval_secs: u64,
    /// Upper bound for the retry delay after failed cycles.
    pub max_backoff_secs: u64,
    /// Per-command timeout for git invocations. 0 disables it.
    pub command_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            repo_dir: PathBuf::from("."),
            remote: "origin".to_string(),
            branch: "main".to_string(),
            git_binary: "git".to_string(),
            interval_secs: 5,
            max_backoff_secs: 60,
            command_timeout_secs: 60,
        }
    }
}

/// Wrapper so the sync section can be read out of the shared config file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    sync: SyncConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be > 0")]
    Zero(&'static str),
    #[error("{0} must not be empty")]
    Empty(&'static str),
}

impl SyncConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs.max(self.interval_secs))
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        (self.command_timeout_secs > 0).then(|| Duration::from_secs(self.command_timeout_secs))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_secs == 0 {
            return Err(ConfigError::Zero("sync.interval_secs"));
        }
        if self.remote.is_empty() {
            return Err(ConfigError::Empty("sync.remote"));
        }
        if self.branch.is_empty() {
            return Err(ConfigError::Empty("sync.branch"));
        }
        if self.git_binary.is_empty() {
            return Err(ConfigError::Empty("sync.git_binary"));
        }
        Ok(())
    }

    /// Read the `[sync]` table of a config file. A missing file or a parse
    /// failure falls back to defaults, with a log line either way.
    pub fn load_from(path: &std::path::Path) -> Self {
        let mut config = match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str::<ConfigFile>(&content) {
                Ok(file) => {
                    tracing::info!(path = %path.display(), "Loaded sync configuration");
                    file.sync
                },
                Err(e) => {
                    tracing::warn!(path = %path.display(), "Failed to parse config: {e}, using defaults");
                    SyncConfig::default()
                },
            },
            Err(_) => {
                tracing::info!(path = %path.display(), "No config file found, using defaults");
                SyncConfig::default()
            },
        };
        config.apply_env();
        config
    }

    /// Environment variable overrides.
    pub fn apply_env(&mut self) {
        if let Ok(remote) = std::env::var("ARTHVIDYA_SYNC_REMOTE")
            && !remote.is_empty()
        {
            self.remote = remote;
        }
        if let Ok(branch) = std::env::var("ARTHVIDYA_SYNC_BRANCH")
            && !branch.is_empty()
        {
            self.branch = branch;
        }
        if let Ok(val) = std::env::var("ARTHVIDYA_SYNC_INTERVAL")
            && let Ok(n) = val.parse::<u64>()
        {
            self.interval_secs = n;
        }
    }
}
