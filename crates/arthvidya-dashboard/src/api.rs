use std::collections::BTreeMap;

use axum::Extension;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use arthvidya_core::game_state::{GamePhase, LogEntry, Team};
use arthvidya_core::{ControlCommandQueue, PlayerActionQueue, TeamId, producer};

use crate::auth::{Role, bearer_token};
use crate::error::AppError;
use crate::state::{AppState, QueueEvent};

#[derive(Debug, Deserialize)]
pub struct LoginBody {
    pub role: String,
    pub secret: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub role: Role,
    pub team_id: Option<TeamId>,
}

/// POST /api/v1/login: exchange a role secret for a session token.
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginBody>,
) -> Result<Json<LoginResponse>, AppError> {
    // Only configured roles get a throttle bucket, so junk names cannot grow it.
    let role = Role::parse(&body.role).filter(|_| state.auth.knows(&body.role));
    let Some(role) = role else {
        tracing::info!(role = %body.role, "Rejected login for unknown role");
        return Err(AppError::Unauthorized("invalid role or secret".to_string()));
    };

    if !state.login_throttle.allows(&body.role).await {
        tracing::warn!(role = %body.role, "Login throttled after repeated failures");
        return Err(AppError::TooManyRequests(
            "too many failed attempts, try again later".to_string(),
        ));
    }

    if !state.auth.validate(&body.role, &body.secret) {
        state.login_throttle.record_failure(&body.role).await;
        tracing::info!(role = %body.role, "Rejected login");
        return Err(AppError::Unauthorized("invalid role or secret".to_string()));
    }

    state.login_throttle.reset(&body.role).await;
    let token = state.sessions.create(role.clone()).await;
    tracing::info!(%role, "Dashboard login");
    Ok(Json(LoginResponse {
        token,
        team_id: role.team_id().map(str::to_string),
        role,
    }))
}

/// POST /api/v1/logout: drop the caller's session.
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> StatusCode {
    if let Some(token) = bearer_token(&headers) {
        state.sessions.revoke(token).await;
    }
    StatusCode::NO_CONTENT
}

/// Game state as the dashboard shows it: messages and log cut to the
/// configured number of most recent entries.
#[derive(Debug, Serialize)]
pub struct StateView {
    pub current_player: usize,
    pub current_team: Option<Team>,
    pub game_phase: GamePhase,
    pub dice_rolled: bool,
    pub current_position: i64,
    pub teams: Vec<Team>,
    pub messages: Vec<LogEntry>,
    pub game_log: Vec<LogEntry>,
    pub pending_actions: BTreeMap<TeamId, Value>,
    /// Team of the caller, `None` for the control role.
    pub viewer_team: Option<TeamId>,
}

/// GET /api/v1/state: current game state summary.
pub async fn get_state(
    State(state): State<AppState>,
    Extension(role): Extension<Role>,
) -> Result<Json<StateView>, AppError> {
    let Some(game) = state.with_store(|m| m.load_game_state()).await? else {
        return Err(AppError::Unavailable(
            "no game state available yet".to_string(),
        ));
    };
    let display = &state.config.display;
    Ok(Json(StateView {
        current_player: game.current_player,
        current_team: game.current_team().cloned(),
        game_phase: game.game_phase.clone(),
        dice_rolled: game.dice_rolled,
        current_position: game.current_position,
        messages: game.recent_messages(display.messages).to_vec(),
        game_log: game.recent_log(display.log_entries).to_vec(),
        teams: game.teams,
        pending_actions: game.pending_actions,
        viewer_team: role.team_id().map(str::to_string),
    }))
}

#[derive(Debug, Deserialize)]
pub struct CommandBody {
    pub command: String,
}

#[derive(Debug, Serialize)]
pub struct CommandResponse {
    pub key: String,
}

/// POST /api/v1/commands: queue a control command. Control role only.
pub async fn post_command(
    State(state): State<AppState>,
    Extension(role): Extension<Role>,
    Json(body): Json<CommandBody>,
) -> Result<(StatusCode, Json<CommandResponse>), AppError> {
    role.require_control()?;
    validate_intent("command", &body.command, state.config.limits.max_intent_len)?;

    let command = body.command.clone();
    let key = state
        .with_store(move |m| producer::send_command(m, &command))
        .await??;
    state.notify(QueueEvent::Command {
        key: key.clone(),
        command: body.command,
    });
    Ok((StatusCode::CREATED, Json(CommandResponse { key })))
}

/// GET /api/v1/commands: pending control commands. Control role only.
pub async fn list_commands(
    State(state): State<AppState>,
    Extension(role): Extension<Role>,
) -> Result<Json<ControlCommandQueue>, AppError> {
    role.require_control()?;
    Ok(Json(state.with_store(|m| m.load_control_commands()).await?))
}

#[derive(Debug, Deserialize)]
pub struct ActionBody {
    pub action: String,
}

#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub team_id: TeamId,
    pub action: String,
    pub timestamp: String,
}

/// POST /api/v1/actions: set the caller's pending action. Team roles only;
/// the team comes from the session, never from the body.
pub async fn post_action(
    State(state): State<AppState>,
    Extension(role): Extension<Role>,
    Json(body): Json<ActionBody>,
) -> Result<(StatusCode, Json<ActionResponse>), AppError> {
    let team_id = role.require_team()?;
    validate_intent("action", &body.action, state.config.limits.max_intent_len)?;

    let (team, action) = (team_id.to_string(), body.action);
    let entry = state
        .with_store(move |m| producer::send_player_action(m, &team, &action))
        .await??;
    state.notify(QueueEvent::Action {
        team_id: entry.team_id.clone(),
        action: entry.action.clone(),
        timestamp: entry.timestamp.clone(),
    });
    Ok((
        StatusCode::CREATED,
        Json(ActionResponse {
            team_id: entry.team_id,
            action: entry.action,
            timestamp: entry.timestamp,
        }),
    ))
}

/// GET /api/v1/actions: pending player actions. Control role only.
pub async fn list_actions(
    State(state): State<AppState>,
    Extension(role): Extension<Role>,
) -> Result<Json<PlayerActionQueue>, AppError> {
    role.require_control()?;
    Ok(Json(state.with_store(|m| m.load_player_actions()).await?))
}

/// Intent names are free-form for the consumer to interpret, but must be a
/// short token.
fn validate_intent(field: &str, value: &str, max_len: usize) -> Result<(), AppError> {
    if value.is_empty() {
        return Err(AppError::BadRequest(format!("{field} must not be empty")));
    }
    if value.len() > max_len {
        return Err(AppError::BadRequest(format!(
            "{field} exceeds {max_len} chars"
        )));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(AppError::BadRequest(format!(
            "{field} may only contain ASCII letters, digits, '_' and '-'"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DashboardConfig;
    use arthvidya_core::GameState;
    use arthvidya_core::queue::{CONTROL_CENTER_SOURCE, actions, commands};
    use arthvidya_core::test_helpers::initialized_memory_manager;

    fn make_state() -> AppState {
        AppState::new(DashboardConfig::default(), initialized_memory_manager()).unwrap()
    }

    fn team(id: &str) -> Extension<Role> {
        Extension(Role::Team(id.to_string()))
    }

    fn login_body(role: &str, secret: &str) -> Json<LoginBody> {
        Json(LoginBody {
            role: role.to_string(),
            secret: secret.to_string(),
        })
    }

    #[tokio::test]
    async fn login_maps_team_role_to_id() {
        let state = make_state();
        let resp = login(State(state.clone()), login_body("Team 3", "redbull"))
            .await
            .unwrap();
        assert_eq!(resp.team_id.as_deref(), Some("T3"));
        assert_eq!(
            state.sessions.role(&resp.token).await,
            Some(Role::Team("T3".to_string()))
        );
    }

    #[tokio::test]
    async fn login_rejects_wrong_secret_and_unknown_role() {
        let state = make_state();
        let wrong = login(State(state.clone()), login_body("Team 3", "ferrari")).await;
        assert!(matches!(wrong.unwrap_err(), AppError::Unauthorized(_)));
        let unknown = login(State(state), login_body("Referee", "ferrari")).await;
        assert!(matches!(unknown.unwrap_err(), AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn repeated_failures_are_throttled() {
        let state = make_state();
        let burst = state.config.limits.login_failure_burst;
        for _ in 0..burst {
            let _ = login(State(state.clone()), login_body("Control Center", "guess")).await;
        }
        let resp = login(State(state), login_body("Control Center", "ferrari")).await;
        assert!(matches!(resp.unwrap_err(), AppError::TooManyRequests(_)));
    }

    #[tokio::test]
    async fn unconfigured_roles_never_reach_the_throttle() {
        let state = make_state();
        for i in 0..500 {
            let role = format!("junk-role-{i}");
            let resp = login(State(state.clone()), login_body(&role, "x")).await;
            assert!(matches!(resp.unwrap_err(), AppError::Unauthorized(_)));
        }
        for n in 6..200 {
            let role = format!("Team {n}");
            let _ = login(State(state.clone()), login_body(&role, "x")).await;
        }
        assert_eq!(state.login_throttle.tracked_roles().await, 0);

        let _ = login(State(state.clone()), login_body("Team 1", "guess")).await;
        assert_eq!(state.login_throttle.tracked_roles().await, 1);
    }

    #[tokio::test]
    async fn state_view_is_bounded() {
        let state = make_state();
        let mut game = GameState::default();
        for i in 0..10 {
            game.push_message(format!("message {i}"));
            game.push_log(format!("log {i}"));
        }
        game.current_player = 2;
        state.manager.save_game_state(&game).unwrap();

        let view = get_state(State(state), team("T1")).await.unwrap();
        assert_eq!(view.messages.len(), 3);
        assert_eq!(view.messages[2].message, "message 9");
        assert_eq!(view.game_log.len(), 5);
        assert_eq!(view.game_log[0].message, "log 5");
        assert_eq!(view.current_team.as_ref().unwrap().id, "T3");
        assert_eq!(view.viewer_team.as_deref(), Some("T1"));
        assert_eq!(view.teams.len(), 5);
    }

    #[tokio::test]
    async fn missing_state_is_unavailable() {
        let manager = arthvidya_core::StateManager::new(std::sync::Arc::new(
            arthvidya_core::MemoryStore::new(),
        ));
        let state = AppState::new(DashboardConfig::default(), manager).unwrap();
        let resp = get_state(State(state), Extension(Role::Control)).await;
        assert!(matches!(resp.unwrap_err(), AppError::Unavailable(_)));
    }

    #[tokio::test]
    async fn control_posts_commands() {
        let state = make_state();
        let mut events = state.queue_events.subscribe();
        let (status, json) = post_command(
            State(state.clone()),
            Extension(Role::Control),
            Json(CommandBody {
                command: commands::NEXT_TURN.to_string(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);

        let queue = state.manager.load_control_commands();
        assert_eq!(queue[&json.key].command, "next_turn");
        assert_eq!(queue[&json.key].source, CONTROL_CENTER_SOURCE);
        assert!(matches!(
            events.try_recv().unwrap(),
            QueueEvent::Command { ref command, .. } if command == "next_turn"
        ));
    }

    #[tokio::test]
    async fn teams_cannot_post_commands() {
        let state = make_state();
        let resp = post_command(
            State(state.clone()),
            team("T1"),
            Json(CommandBody {
                command: commands::RESET_GAME.to_string(),
            }),
        )
        .await;
        assert!(matches!(resp.unwrap_err(), AppError::Forbidden(_)));
        assert!(state.manager.load_control_commands().is_empty());
    }

    #[tokio::test]
    async fn team_action_uses_session_team() {
        let state = make_state();
        let (status, json) = post_action(
            State(state.clone()),
            team("T4"),
            Json(ActionBody {
                action: actions::SPIN_MYSTERY.to_string(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json.team_id, "T4");
        assert_eq!(state.manager.load_player_actions()["T4"].action, "spin_mystery");
    }

    #[tokio::test]
    async fn control_cannot_post_team_actions() {
        let state = make_state();
        let resp = post_action(
            State(state),
            Extension(Role::Control),
            Json(ActionBody {
                action: actions::END_TURN.to_string(),
            }),
        )
        .await;
        assert!(matches!(resp.unwrap_err(), AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn queues_visible_to_control_only() {
        let state = make_state();
        assert!(list_commands(State(state.clone()), team("T2")).await.is_err());
        assert!(list_actions(State(state.clone()), team("T2")).await.is_err());
        assert!(list_commands(State(state.clone()), Extension(Role::Control)).await.is_ok());
        assert!(list_actions(State(state), Extension(Role::Control)).await.is_ok());
    }

    #[test]
    fn intent_validation() {
        assert!(validate_intent("command", "roll_dice", 64).is_ok());
        assert!(validate_intent("command", "declare-bankruptcy", 64).is_ok());
        assert!(validate_intent("command", "", 64).is_err());
        assert!(validate_intent("command", "rm -rf", 64).is_err());
        assert!(validate_intent("command", &"x".repeat(65), 64).is_err());
    }
}
