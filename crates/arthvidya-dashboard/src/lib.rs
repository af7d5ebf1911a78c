pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod health;
pub mod rate_limit;
pub mod sse;
pub mod state;

use axum::Router;
use axum::middleware;
use axum::routing::{get, post};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use arthvidya_sync::{GitTransport, SyncConfig, SyncLoop, SyncStatus, tracked_files};

use state::AppState;

/// Build the Axum router over an application state.
pub fn build_app(state: AppState) -> Router<()> {
    // Routes that need a session (role resolved by the middleware)
    let session_routes = Router::new()
        .route("/state", get(api::get_state))
        .route(
            "/commands",
            post(api::post_command).get(api::list_commands),
        )
        .route("/actions", post(api::post_action).get(api::list_actions))
        .route("/stream", get(sse::queue_stream))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::session_middleware,
        ));

    let public_routes = Router::new()
        .route("/login", post(api::login))
        .route("/logout", post(api::logout));

    Router::new()
        .route("/health", get(health::health_check))
        .nest("/api/v1", public_routes.merge(session_routes))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// Background task that periodically drops login-throttle buckets that have
/// refilled and sessions that have expired, until `cancel` fires.
pub fn spawn_housekeeping(
    state: AppState,
    period: std::time::Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let buckets = state.login_throttle.cleanup().await;
                    let sessions = state.sessions.purge_expired().await;
                    if buckets + sessions > 0 {
                        tracing::debug!(buckets, sessions, "Housekeeping swept idle entries");
                    }
                },
            }
        }
    })
}

/// Start the periodic push loop for `data_dir` on a background task. Returns
/// the task handle and a feed of its status.
pub fn spawn_sync_loop(
    config: &SyncConfig,
    data_dir: &std::path::Path,
    cancel: CancellationToken,
) -> (JoinHandle<SyncStatus>, tokio::sync::watch::Receiver<SyncStatus>) {
    let sync = SyncLoop::new(GitTransport::new(config), tracked_files(data_dir), config);
    let status = sync.subscribe();
    let handle = tokio::spawn(sync.run(cancel));
    (handle, status)
}
