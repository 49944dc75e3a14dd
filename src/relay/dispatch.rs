/// Command handlers for registered connections.
///
/// Every outcome, including every validation failure, becomes a reply line
/// for the caller; notices for other connections go through the
/// broadcaster. Nothing here touches the caller's socket directly.
use tracing::debug;

use super::broadcast;
use super::command::{Command, CommandError};
use super::config::RoomCatalog;
use super::protocol::{self, notice, HELP_LINES};
use super::registry::{ConnId, RegistryError, RoomChange};
use super::server::ServerState;

/// Result of handling a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    /// Lines to send back to the caller.
    Reply(Vec<String>),
    /// The caller asked to disconnect, or is no longer registered.
    Quit,
}

/// Parse and execute one command line from connection `id`.
pub async fn handle_command(state: &ServerState, id: ConnId, line: &str) -> CommandResult {
    let command = match Command::parse(line) {
        Ok(command) => command,
        Err(CommandError::Usage(usage)) => {
            return CommandResult::Reply(vec![notice(format!("Usage: {usage}"))]);
        }
        Err(CommandError::Unknown(name)) => {
            debug!(conn = %id, command = %name, "unknown command");
            return CommandResult::Reply(vec![notice(format!(
                "Unknown command: {name}. Type /help for available commands."
            ))]);
        }
        Err(CommandError::Empty) => {
            return CommandResult::Reply(vec![protocol::help_hint()]);
        }
    };

    let Some(conn) = state.registry.connection(id).await else {
        return CommandResult::Quit;
    };

    match command {
        Command::Rooms => CommandResult::Reply(list_rooms(state, conn.room.as_deref()).await),
        Command::Join(room) => join(state, id, &conn.name, &room).await,
        Command::Leave => leave(state, id, &conn.name).await,
        Command::Users => CommandResult::Reply(match conn.room {
            Some(room) => list_users(state, &room).await,
            None => vec![protocol::not_in_room()],
        }),
        Command::Help => CommandResult::Reply(help()),
        Command::Quit => CommandResult::Quit,
    }
}

/// Room catalog listing, marking `current`.
pub(crate) async fn list_rooms(state: &ServerState, current: Option<&str>) -> Vec<String> {
    let rooms = state.registry.room_catalog().await;
    if rooms.is_empty() {
        return vec![notice("No active rooms.")];
    }
    let heading = match state.registry.catalog() {
        RoomCatalog::Fixed(_) => "Available rooms:",
        RoomCatalog::Dynamic => "Active rooms:",
    };
    let mut lines = vec![notice(heading)];
    for (room, count) in rooms {
        let marker = if current == Some(room.as_str()) { " <- you are here" } else { "" };
        lines.push(format!("  - {room} ({}){marker}", protocol::member_count(count)));
    }
    lines
}

async fn list_users(state: &ServerState, room: &str) -> Vec<String> {
    let members = state.registry.room_members(room).await;
    let mut lines = vec![notice(format!("Users in room '{room}':"))];
    lines.extend(members.into_iter().map(|name| format!("  - {name}")));
    lines
}

fn help() -> Vec<String> {
    let mut lines = vec![notice(HELP_LINES[0])];
    lines.extend(HELP_LINES[1..].iter().map(|line| line.to_string()));
    lines
}

/// Tell the old room about a departure and the new room about an arrival.
async fn announce_move(state: &ServerState, id: ConnId, name: &str, change: &RoomChange) {
    if let Some(ref old) = change.previous {
        broadcast::to_room(&state.registry, old, &protocol::left_room(name, old), Some(id)).await;
    }
    if let Some(ref new) = change.current {
        broadcast::to_room(&state.registry, new, &protocol::joined_room(name, new), Some(id)).await;
    }
}

async fn join(state: &ServerState, id: ConnId, name: &str, room: &str) -> CommandResult {
    let reply = match state.registry.join_room(id, room).await {
        Ok(change) => {
            announce_move(state, id, name, &change).await;
            let room = change.current.unwrap_or_default();
            notice(format!("You joined room '{room}'."))
        }
        Err(RegistryError::InvalidRoom(room)) => notice(format!(
            "Invalid room name '{room}'. Type /rooms to see the list."
        )),
        Err(RegistryError::AlreadyInRoom(room)) => {
            notice(format!("You are already in room '{room}'."))
        }
        Err(RegistryError::NotInRoom) => protocol::not_in_room(),
        Err(RegistryError::UnknownConnection) => return CommandResult::Quit,
    };
    CommandResult::Reply(vec![reply])
}

async fn leave(state: &ServerState, id: ConnId, name: &str) -> CommandResult {
    let reply = match state.registry.leave_room(id).await {
        Ok(change) => {
            announce_move(state, id, name, &change).await;
            let old = change.previous.as_deref().unwrap_or_default();
            match change.current {
                Some(new) => notice(format!(
                    "You left room '{old}'. You are back in room '{new}'."
                )),
                None => notice(format!("You left room '{old}'.")),
            }
        }
        Err(RegistryError::NotInRoom) => notice("You are not in any room."),
        Err(RegistryError::AlreadyInRoom(room)) => {
            notice(format!("You are already in the default room '{room}'."))
        }
        Err(RegistryError::InvalidRoom(room)) => notice(format!("Invalid room name '{room}'.")),
        Err(RegistryError::UnknownConnection) => return CommandResult::Quit,
    };
    CommandResult::Reply(vec![reply])
}
