//! Turning dashboard intents into queue writes.

use crate::manager::StateManager;
use crate::queue::{
    CONTROL_CENTER_SOURCE, ControlCommand, ControlCommandQueue, PlayerAction, PlayerActionQueue,
};
use crate::store::{DocumentKind, StoreError};
use crate::time::{next_tick, timestamp_now};

/// Append a control command keyed by the current timestamp. Returns the key.
///
/// If the key is already taken (two commands in the same microsecond) it is
/// moved forward until it is free, so no command is dropped.
pub fn send_command(manager: &StateManager, command: &str) -> Result<String, StoreError> {
    send_command_from(manager, command, CONTROL_CENTER_SOURCE)
}

/// [`send_command`] with an explicit `source` tag.
pub fn send_command_from(
    manager: &StateManager,
    command: &str,
    source: &str,
) -> Result<String, StoreError> {
    let key = manager.update(
        DocumentKind::ControlCommands,
        |queue: &mut ControlCommandQueue| {
            let key = unique_key(queue, timestamp_now());
            queue.insert(
                key.clone(),
                ControlCommand {
                    command: command.to_string(),
                    timestamp: key.clone(),
                    source: source.to_string(),
                },
            );
            key
        },
    )?;
    tracing::info!(command, source, key = %key, "Queued control command");
    Ok(key)
}

/// Replace the pending action of `team_id`. A team has at most one pending
/// action; the previous one, if any, is discarded.
pub fn send_player_action(
    manager: &StateManager,
    team_id: &str,
    action: &str,
) -> Result<PlayerAction, StoreError> {
    let entry = PlayerAction {
        action: action.to_string(),
        timestamp: timestamp_now(),
        team_id: team_id.to_string(),
    };
    let replaced = manager.update(
        DocumentKind::PlayerActions,
        |queue: &mut PlayerActionQueue| queue.insert(team_id.to_string(), entry.clone()),
    )?;
    if let Some(prev) = replaced {
        tracing::debug!(team_id, previous = %prev.action, "Overwrote pending action");
    }
    tracing::info!(team_id, action, "Queued player action");
    Ok(entry)
}

fn unique_key(queue: &ControlCommandQueue, mut key: String) -> String {
    while queue.contains_key(&key) {
        match next_tick(&key) {
            Some(next) => key = next,
            None => key.push('+'),
        }
    }
    key
}
