use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use arthvidya_core::game_state::{DEFAULT_VISIBLE_LOG, DEFAULT_VISIBLE_MESSAGES};
use arthvidya_sync::SyncConfig;

/// Default location of the config file, relative to the working directory.
pub const CONFIG_FILE: &str = "arthvidya.toml";

/// Top-level dashboard configuration, loaded from `arthvidya.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub listen_addr: String,
    /// Directory holding the three exchange documents.
    pub data_dir: PathBuf,
    pub auth: AuthFileConfig,
    pub display: DisplayConfig,
    pub limits: LimitsConfig,
    pub sync: SyncConfig,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8501".to_string(),
            data_dir: PathBuf::from("."),
            auth: AuthFileConfig::default(),
            display: DisplayConfig::default(),
            limits: LimitsConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Plaintext role secrets. Demo only.
    #[default]
    Static,
    /// HMAC-SHA256 digests of the secrets keyed by `pepper`.
    Digest,
}

/// Auth section of the config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthFileConfig {
    pub mode: AuthMode,
    /// Role name -> secret (static mode) or hex digest (digest mode).
    /// Empty in static mode means the built-in demo secrets.
    pub secrets: BTreeMap<String, String>,
    pub pepper: Option<String>,
    pub session_ttl_secs: u64,
}

impl Default for AuthFileConfig {
    fn default() -> Self {
        Self {
            mode: AuthMode::Static,
            secrets: BTreeMap::new(),
            pepper: None,
            session_ttl_secs: 12 * 60 * 60,
        }
    }
}

/// How much of the append-only sequences the state view returns.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub messages: usize,
    pub log_entries: usize,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            messages: DEFAULT_VISIBLE_MESSAGES,
            log_entries: DEFAULT_VISIBLE_LOG,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_sse_subscribers: usize,
    pub broadcast_capacity: usize,
    /// Failed logins allowed per role before throttling.
    pub login_failure_burst: usize,
    /// Failed-login allowance regained per second.
    pub login_refill_per_sec: f64,
    pub max_intent_len: usize,
    /// How often idle login buckets and expired sessions are swept.
    pub housekeeping_interval_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_sse_subscribers: 100,
            broadcast_capacity: 256,
            login_failure_burst: 5,
            login_refill_per_sec: 0.2,
            max_intent_len: 64,
            housekeeping_interval_secs: 60,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("listen_addr {0:?} is not a valid socket address")]
    ListenAddr(String),
    #[error("{0} must be > 0")]
    Zero(&'static str),
    #[error("auth.mode = \"digest\" requires a pepper (auth.pepper or ARTHVIDYA_PEPPER)")]
    MissingPepper,
    #[error("auth.mode = \"digest\" requires at least one entry in auth.secrets")]
    NoDigests,
    #[error(transparent)]
    Sync(#[from] arthvidya_sync::config::ConfigError),
}

impl DashboardConfig {
    /// Check the configuration, logging warnings for risky but legal settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::ListenAddr(self.listen_addr.clone()));
        }
        if self.auth.session_ttl_secs == 0 {
            return Err(ConfigError::Zero("auth.session_ttl_secs"));
        }
        if self.limits.max_sse_subscribers == 0 {
            return Err(ConfigError::Zero("limits.max_sse_subscribers"));
        }
        if self.limits.broadcast_capacity == 0 {
            return Err(ConfigError::Zero("limits.broadcast_capacity"));
        }
        if self.limits.login_failure_burst == 0 {
            return Err(ConfigError::Zero("limits.login_failure_burst"));
        }
        if self.limits.max_intent_len == 0 {
            return Err(ConfigError::Zero("limits.max_intent_len"));
        }
        if self.limits.housekeeping_interval_secs == 0 {
            return Err(ConfigError::Zero("limits.housekeeping_interval_secs"));
        }

        match self.auth.mode {
            AuthMode::Static => {
                tracing::warn!(
                    "auth.mode is \"static\": role secrets are compared in plaintext, use \"digest\" outside a trusted LAN"
                );
            },
            AuthMode::Digest => {
                if self.auth.pepper.as_deref().is_none_or(str::is_empty) {
                    return Err(ConfigError::MissingPepper);
                }
                if self.auth.secrets.is_empty() {
                    return Err(ConfigError::NoDigests);
                }
            },
        }
        if self.auth.pepper.is_some() && std::env::var("ARTHVIDYA_PEPPER").is_err() {
            tracing::warn!("auth.pepper is set in the config file, use ARTHVIDYA_PEPPER in production");
        }

        if self.sync.enabled {
            self.sync.validate()?;
        }
        Ok(())
    }

    /// Load config from `path` if it exists, then apply env var overrides.
    pub fn load_from(path: &Path) -> Self {
        let mut config = match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str::<DashboardConfig>(&content) {
                Ok(cfg) => {
                    tracing::info!(path = %path.display(), "Loaded configuration");
                    cfg
                },
                Err(e) => {
                    tracing::warn!(path = %path.display(), "Failed to parse config: {e}, using defaults");
                    DashboardConfig::default()
                },
            },
            Err(_) => {
                tracing::info!(path = %path.display(), "No config file found, using defaults");
                DashboardConfig::default()
            },
        };

        if let Ok(addr) = std::env::var("ARTHVIDYA_LISTEN_ADDR")
            && !addr.is_empty()
        {
            config.listen_addr = addr;
        }
        if let Ok(dir) = std::env::var("ARTHVIDYA_DATA_DIR")
            && !dir.is_empty()
        {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(pepper) = std::env::var("ARTHVIDYA_PEPPER")
            && !pepper.is_empty()
        {
            config.auth.pepper = Some(pepper);
        }
        config.sync.apply_env();

        config
    }
}
