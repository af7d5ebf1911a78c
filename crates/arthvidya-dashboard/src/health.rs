use std::sync::atomic::Ordering;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use arthvidya_sync::SyncStatus;

use crate::state::AppState;

/// Structured health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub data_dir: String,
    pub has_game_state: bool,
    pub sessions: usize,
    pub sse_subscribers: usize,
    /// Absent when the sync loop is not running in this process.
    pub sync: Option<SyncStatus>,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let has_game_state = state
        .with_store(|m| m.load_game_state().is_some())
        .await
        .unwrap_or(false);
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        data_dir: state.config.data_dir.display().to_string(),
        has_game_state,
        sessions: state.sessions.active_count().await,
        sse_subscribers: state.sse_subscriber_count.load(Ordering::Relaxed),
        sync: state.sync_status.as_ref().map(|rx| rx.borrow().clone()),
    })
}
