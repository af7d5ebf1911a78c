use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, watch};

use arthvidya_core::StateManager;
use arthvidya_sync::SyncStatus;

use crate::auth::{
    AuthError, Authenticator, DigestAuthenticator, SessionStore, StaticSecretAuthenticator,
};
use crate::config::{AuthFileConfig, AuthMode, DashboardConfig};
use crate::error::AppError;
use crate::rate_limit::LoginThrottle;

/// Notification sent to stream subscribers after every queue write.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "queue", rename_all = "snake_case")]
pub enum QueueEvent {
    Command { key: String, command: String },
    Action { team_id: String, action: String, timestamp: String },
}

#[derive(Clone)]
pub struct AppState {
    pub manager: StateManager,
    pub auth: Arc<dyn Authenticator>,
    pub sessions: Arc<SessionStore>,
    pub login_throttle: Arc<LoginThrottle>,
    pub queue_events: broadcast::Sender<QueueEvent>,
    pub sse_subscriber_count: Arc<AtomicUsize>,
    pub sync_status: Option<watch::Receiver<SyncStatus>>,
    pub config: Arc<DashboardConfig>,
}

impl AppState {
    pub fn new(config: DashboardConfig, manager: StateManager) -> Result<Self, AuthError> {
        let auth = authenticator_from(&config.auth)?;
        let (queue_events, _) = broadcast::channel(config.limits.broadcast_capacity);
        Ok(Self {
            manager,
            auth,
            sessions: Arc::new(SessionStore::new(Duration::from_secs(
                config.auth.session_ttl_secs,
            ))),
            login_throttle: Arc::new(LoginThrottle::new(
                config.limits.login_failure_burst as f64,
                config.limits.login_refill_per_sec,
            )),
            queue_events,
            sse_subscriber_count: Arc::new(AtomicUsize::new(0)),
            sync_status: None,
            config: Arc::new(config),
        })
    }

    /// Attach the status feed of a running sync loop.
    pub fn with_sync_status(mut self, status: watch::Receiver<SyncStatus>) -> Self {
        self.sync_status = Some(status);
        self
    }

    /// Run a store operation on the blocking pool. `FileStore` reads, fsyncs
    /// and renames under a std mutex, which must stay off the async workers.
    pub async fn with_store<T, F>(&self, op: F) -> Result<T, AppError>
    where
        F: FnOnce(&StateManager) -> T + Send + 'static,
        T: Send + 'static,
    {
        let manager = self.manager.clone();
        tokio::task::spawn_blocking(move || op(&manager))
            .await
            .map_err(|e| AppError::Internal(format!("store task failed: {e}")))
    }

    /// Tell stream subscribers about a queue write. Having none is fine.
    pub fn notify(&self, event: QueueEvent) {
        let _ = self.queue_events.send(event);
    }
}

fn authenticator_from(auth: &AuthFileConfig) -> Result<Arc<dyn Authenticator>, AuthError> {
    match auth.mode {
        AuthMode::Static if auth.secrets.is_empty() => {
            tracing::warn!("No role secrets configured, using the built-in demo secrets");
            Ok(Arc::new(StaticSecretAuthenticator::demo()))
        },
        AuthMode::Static => Ok(Arc::new(StaticSecretAuthenticator::new(
            auth.secrets.clone(),
        ))),
        AuthMode::Digest => {
            let pepper = auth.pepper.as_deref().unwrap_or_default();
            Ok(Arc::new(DigestAuthenticator::new(pepper, &auth.secrets)?))
        },
    }
}

/// Counts a live connection for as long as it is held.
pub struct ConnectionGuard {
    counter: Arc<AtomicUsize>,
}

impl ConnectionGuard {
    pub fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self { counter }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::Relaxed);
    }
}
