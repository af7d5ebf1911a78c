use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::game_state::TeamId;

/// `source` recorded on commands issued from the dashboard's control role.
pub const CONTROL_CENTER_SOURCE: &str = "control_center";

/// Commands the control role can issue. The consumer decides what to do with
/// anything outside this list.
pub mod commands {
    pub const ROLL_DICE: &str = "roll_dice";
    pub const NEXT_TURN: &str = "next_turn";
    pub const BUY_PROPERTY: &str = "buy_property";
    pub const SELL_PROPERTY: &str = "sell_property";
    pub const TEST_CHANCE: &str = "test_chance";
    pub const TEST_MYSTERY: &str = "test_mystery";
    pub const START_TRADING: &str = "start_trading";
    pub const RESET_GAME: &str = "reset_game";

    pub const ALL: &[&str] = &[
        ROLL_DICE,
        NEXT_TURN,
        BUY_PROPERTY,
        SELL_PROPERTY,
        TEST_CHANCE,
        TEST_MYSTERY,
        START_TRADING,
        RESET_GAME,
    ];
}

/// Actions a team role can queue for itself.
pub mod actions {
    pub const ROLL_DICE: &str = "roll_dice";
    pub const END_TURN: &str = "end_turn";
    pub const BUY_PROPERTY: &str = "buy_property";
    pub const SELL_PROPERTY: &str = "sell_property";
    pub const TAKE_CHANCE: &str = "take_chance";
    pub const SPIN_MYSTERY: &str = "spin_mystery";
    pub const START_TRADING: &str = "start_trading";

    pub const ALL: &[&str] = &[
        ROLL_DICE,
        END_TURN,
        BUY_PROPERTY,
        SELL_PROPERTY,
        TAKE_CHANCE,
        SPIN_MYSTERY,
        START_TRADING,
    ];
}

/// Pending action for one team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerAction {
    pub action: String,
    pub timestamp: String,
    pub team_id: TeamId,
}

/// A whole-game command from the control role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlCommand {
    pub command: String,
    pub timestamp: String,
    pub source: String,
}

/// `player_actions.json`: at most one pending action per team.
pub type PlayerActionQueue = BTreeMap<TeamId, PlayerAction>;

/// `control_commands.json`: keyed by ISO 8601 timestamp, append-only.
pub type ControlCommandQueue = BTreeMap<String, ControlCommand>;
