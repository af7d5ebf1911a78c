use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::time::timestamp_now;

/// Stable short code identifying a team ("T1".."T5").
pub type TeamId = String;

/// Number of teams in a freshly initialized game.
pub const DEFAULT_TEAM_COUNT: usize = 5;

/// Balance every team starts with.
pub const STARTING_BALANCE: i64 = 10_000_000;

/// Display colors assigned to teams in order.
pub const TEAM_COLORS: &[&str] = &["#D32F2F", "#1976D2", "#388E3C", "#F57C00", "#7B1FA2"];

/// Number of messages the dashboard shows by default.
pub const DEFAULT_VISIBLE_MESSAGES: usize = 3;

/// Number of game log entries the dashboard shows by default.
pub const DEFAULT_VISIBLE_LOG: usize = 5;

/// Phase tag of the current turn. The consumer may write tags this crate does
/// not know about; those are carried through as `Other`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum GamePhase {
    #[default]
    Waiting,
    Rolling,
    Moving,
    Resolving,
    Trading,
    Other(String),
}

impl GamePhase {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Waiting => "waiting",
            Self::Rolling => "rolling",
            Self::Moving => "moving",
            Self::Resolving => "resolving",
            Self::Trading => "trading",
            Self::Other(tag) => tag,
        }
    }
}

impl From<String> for GamePhase {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "waiting" => Self::Waiting,
            "rolling" => Self::Rolling,
            "moving" => Self::Moving,
            "resolving" => Self::Resolving,
            "trading" => Self::Trading,
            _ => Self::Other(tag),
        }
    }
}

impl From<GamePhase> for String {
    fn from(phase: GamePhase) -> Self {
        match phase {
            GamePhase::Other(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for GamePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One participant of the game. Per-team fields the game adds are kept in
/// `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    pub color: String,
    pub balance: i64,
    pub pos: u32,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Team {
    /// Team number `n` (1-based) with default name, color and balance.
    pub fn numbered(n: usize) -> Self {
        Self {
            id: format!("T{n}"),
            name: format!("Team {n}"),
            color: TEAM_COLORS[(n - 1) % TEAM_COLORS.len()].to_string(),
            balance: STARTING_BALANCE,
            pos: 0,
            extra: Map::new(),
        }
    }
}

/// A timestamped text entry in `messages` or `game_log`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub message: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LogEntry {
    pub fn now(message: impl Into<String>) -> Self {
        Self {
            timestamp: timestamp_now(),
            message: message.into(),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameStateError {
    #[error("game has no teams")]
    NoTeams,
    #[error("current_player {current} out of range for {teams} teams")]
    CurrentPlayerOutOfRange { current: usize, teams: usize },
    #[error("duplicate team id {0}")]
    DuplicateTeam(TeamId),
}

/// The singleton game state document (`game_state.json`).
///
/// Written by the game process, read by the dashboard. Fields this crate does
/// not model are kept in `extra` so a full-document save never drops them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    pub current_player: usize,
    pub game_phase: GamePhase,
    pub dice_rolled: bool,
    #[serde(default)]
    pub current_position: i64,
    #[serde(default)]
    pub properties: Map<String, Value>,
    pub teams: Vec<Team>,
    #[serde(default)]
    pub messages: Vec<LogEntry>,
    #[serde(default)]
    pub pending_actions: BTreeMap<TeamId, Value>,
    #[serde(default)]
    pub game_log: Vec<LogEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for GameState {
    fn default() -> Self {
        Self::with_team_count(DEFAULT_TEAM_COUNT)
    }
}

impl GameState {
    /// Fresh game with `count` numbered teams at the starting balance.
    pub fn with_team_count(count: usize) -> Self {
        Self {
            current_player: 0,
            game_phase: GamePhase::Waiting,
            dice_rolled: false,
            current_position: 0,
            properties: Map::new(),
            teams: (1..=count).map(Team::numbered).collect(),
            messages: Vec::new(),
            pending_actions: BTreeMap::new(),
            game_log: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Check the document-level invariants.
    pub fn validate(&self) -> Result<(), GameStateError> {
        if self.teams.is_empty() {
            return Err(GameStateError::NoTeams);
        }
        if self.current_player >= self.teams.len() {
            return Err(GameStateError::CurrentPlayerOutOfRange {
                current: self.current_player,
                teams: self.teams.len(),
            });
        }
        for (i, team) in self.teams.iter().enumerate() {
            if self.teams[..i].iter().any(|t| t.id == team.id) {
                return Err(GameStateError::DuplicateTeam(team.id.clone()));
            }
        }
        Ok(())
    }

    pub fn current_team(&self) -> Option<&Team> {
        self.teams.get(self.current_player)
    }

    pub fn team(&self, id: &str) -> Option<&Team> {
        self.teams.iter().find(|t| t.id == id)
    }

    /// The most recent `n` messages, oldest first.
    pub fn recent_messages(&self, n: usize) -> &[LogEntry] {
        tail(&self.messages, n)
    }

    /// The most recent `n` game log entries, oldest first.
    pub fn recent_log(&self, n: usize) -> &[LogEntry] {
        tail(&self.game_log, n)
    }

    pub fn push_message(&mut self, message: impl Into<String>) {
        self.messages.push(LogEntry::now(message));
    }

    pub fn push_log(&mut self, message: impl Into<String>) {
        self.game_log.push(LogEntry::now(message));
    }
}

fn tail<T>(items: &[T], n: usize) -> &[T] {
    &items[items.len().saturating_sub(n)..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_game_has_five_funded_teams() {
        let state = GameState::default();
        assert_eq!(state.current_player, 0);
        assert!(!state.dice_rolled);
        assert_eq!(state.game_phase, GamePhase::Waiting);
        assert_eq!(state.teams.len(), DEFAULT_TEAM_COUNT);
        for (i, team) in state.teams.iter().enumerate() {
            assert_eq!(team.id, format!("T{}", i + 1));
            assert_eq!(team.balance, STARTING_BALANCE);
            assert_eq!(team.pos, 0);
        }
        assert_eq!(state.teams[1].color, "#1976D2");
        assert!(state.validate().is_ok());
    }

    #[test]
    fn default_document_matches_legacy_shape() {
        let json = serde_json::to_value(GameState::default()).unwrap();
        assert_eq!(json["current_player"], 0);
        assert_eq!(json["game_phase"], "waiting");
        assert_eq!(json["dice_rolled"], false);
        assert_eq!(json["current_position"], 0);
        assert_eq!(json["properties"], serde_json::json!({}));
        assert_eq!(json["pending_actions"], serde_json::json!({}));
        assert_eq!(json["teams"][4]["name"], "Team 5");
        assert_eq!(json["teams"][4]["balance"], 10_000_000);
    }

    #[test]
    fn unknown_phase_is_preserved() {
        let phase: GamePhase = serde_json::from_str("\"auction\"").unwrap();
        assert_eq!(phase, GamePhase::Other("auction".to_string()));
        assert_eq!(serde_json::to_string(&phase).unwrap(), "\"auction\"");

        let known: GamePhase = serde_json::from_str("\"trading\"").unwrap();
        assert_eq!(known, GamePhase::Trading);
    }

    #[test]
    fn unknown_fields_survive_round_trip() {
        let raw = serde_json::json!({
            "current_player": 1,
            "game_phase": "rolling",
            "dice_rolled": true,
            "teams": [
                {"id": "T1", "name": "Team 1", "color": "#fff", "balance": -5, "pos": 3,
                 "jail_turns": 2, "owned": ["Mumbai"]},
                {"id": "T2", "name": "Team 2", "color": "#000", "balance": 7, "pos": 0}
            ],
            "last_dice": [3, 4]
        });
        let state: GameState = serde_json::from_value(raw).unwrap();
        assert_eq!(state.extra["last_dice"], serde_json::json!([3, 4]));
        assert!(state.messages.is_empty());

        let back = serde_json::to_value(&state).unwrap();
        assert_eq!(back["last_dice"], serde_json::json!([3, 4]));
        assert_eq!(back["teams"][0]["balance"], -5);
        assert_eq!(state.teams[0].extra["jail_turns"], 2);
        assert_eq!(back["teams"][0]["jail_turns"], 2);
        assert_eq!(back["teams"][0]["owned"], serde_json::json!(["Mumbai"]));
        assert!(back["teams"][1].get("jail_turns").is_none());
    }

    #[test]
    fn validate_rejects_out_of_range_player() {
        let mut state = GameState::default();
        state.current_player = 5;
        assert_eq!(
            state.validate(),
            Err(GameStateError::CurrentPlayerOutOfRange {
                current: 5,
                teams: 5
            })
        );

        state.current_player = 0;
        state.teams[1].id = "T1".to_string();
        assert_eq!(
            state.validate(),
            Err(GameStateError::DuplicateTeam("T1".to_string()))
        );

        assert_eq!(
            GameState::with_team_count(0).validate(),
            Err(GameStateError::NoTeams)
        );
    }

    #[test]
    fn recent_entries_are_bounded_suffix() {
        let mut state = GameState::default();
        for i in 0..8 {
            state.push_log(format!("entry {i}"));
        }
        state.push_message("only one");

        let recent = state.recent_log(DEFAULT_VISIBLE_LOG);
        assert_eq!(recent.len(), 5);
        assert_eq!(recent[0].message, "entry 3");
        assert_eq!(recent[4].message, "entry 7");
        assert_eq!(state.recent_messages(DEFAULT_VISIBLE_MESSAGES).len(), 1);
    }

    #[test]
    fn current_team_follows_index() {
        let mut state = GameState::default();
        state.current_player = 2;
        assert_eq!(state.current_team().unwrap().id, "T3");
        assert_eq!(state.team("T5").unwrap().name, "Team 5");
        assert!(state.team("T9").is_none());
    }
}
