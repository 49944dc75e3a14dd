/// Relay configuration, read from `COVE_*` environment variables at startup.
///
/// The product variants the relay supports (fixed vs. dynamic room catalog,
/// auto-join vs. explicit room selection, lobby vs. default room on leave,
/// room vs. global announcements) are all selected here.
use super::registry::{clean_room_name, fold};

pub const DEFAULT_BIND: &str = "0.0.0.0:8080";
pub const DEFAULT_ROOM: &str = "general";

/// Which room names are valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomCatalog {
    /// Any well-formed name; rooms are created on first join.
    Dynamic,
    /// Only these rooms exist, in this order.
    Fixed(Vec<String>),
}

/// What happens right after a name is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryMode {
    /// Join the default room immediately.
    DefaultRoom,
    /// Show the catalog and wait for the user to pick a room.
    SelectRoom,
}

/// Where `/leave` sends a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveMode {
    /// Unassigned; no room traffic reaches it until the next `/join`.
    Lobby,
    /// Back to the default room.
    DefaultRoom,
}

/// Who hears about connects and disconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnounceScope {
    /// Only the room the connection entered or left.
    Room,
    /// Every connection on the server.
    Global,
}

/// Template for relayed chat lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatStyle {
    /// `[room] sender: text`
    Colon,
    /// `[room] sender > text`
    Arrow,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: unrecognised value {value:?}")]
    InvalidValue { var: &'static str, value: String },
    #[error("COVE_BIND: no bind address given")]
    NoBindAddress,
    #[error("COVE_ROOMS: room catalog is empty")]
    EmptyCatalog,
    #[error("invalid room name {0:?}")]
    InvalidRoomName(String),
    #[error("COVE_ROOMS: room {0:?} listed twice")]
    DuplicateRoom(String),
    #[error("default room {0:?} is not in the room catalog")]
    DefaultRoomNotInCatalog(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind: Vec<String>,
    pub catalog: RoomCatalog,
    /// Protected room: never pruned, always listed.
    pub default_room: String,
    pub entry: EntryMode,
    pub leave: LeaveMode,
    pub announce: AnnounceScope,
    pub chat_style: ChatStyle,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: vec![DEFAULT_BIND.to_owned()],
            catalog: RoomCatalog::Dynamic,
            default_room: DEFAULT_ROOM.to_owned(),
            entry: EntryMode::DefaultRoom,
            leave: LeaveMode::Lobby,
            announce: AnnounceScope::Room,
            chat_style: ChatStyle::Colon,
        }
    }
}

/// Split a comma-separated variable into trimmed, non-empty items.
fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parse a keyword variable, falling back to `default` when unset.
fn parse_choice<T: Copy>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
    choices: &[(&str, T)],
) -> Result<T, ConfigError> {
    let Some(raw) = lookup(var) else {
        return Ok(default);
    };
    let wanted = raw.trim().to_ascii_lowercase();
    choices
        .iter()
        .find(|(key, _)| *key == wanted)
        .map(|(_, value)| *value)
        .ok_or(ConfigError::InvalidValue { var, value: raw })
}

impl Config {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from any key lookup (environment, test map).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind = match lookup("COVE_BIND") {
            Some(raw) => split_list(&raw),
            None => vec![DEFAULT_BIND.to_owned()],
        };
        if bind.is_empty() {
            return Err(ConfigError::NoBindAddress);
        }

        let catalog = match lookup("COVE_ROOMS") {
            None => RoomCatalog::Dynamic,
            Some(raw) => {
                let mut rooms: Vec<String> = Vec::new();
                for room in split_list(&raw) {
                    let Some(clean) = clean_room_name(&room) else {
                        return Err(ConfigError::InvalidRoomName(room));
                    };
                    if rooms.iter().any(|r| fold(r) == fold(clean)) {
                        return Err(ConfigError::DuplicateRoom(room));
                    }
                    rooms.push(clean.to_owned());
                }
                if rooms.is_empty() {
                    return Err(ConfigError::EmptyCatalog);
                }
                RoomCatalog::Fixed(rooms)
            }
        };

        let requested_default = lookup("COVE_DEFAULT_ROOM");
        let default_room = match (&catalog, requested_default) {
            (RoomCatalog::Dynamic, None) => DEFAULT_ROOM.to_owned(),
            (RoomCatalog::Dynamic, Some(raw)) => clean_room_name(&raw)
                .map(str::to_owned)
                .ok_or(ConfigError::InvalidRoomName(raw))?,
            // `Fixed` is never empty here.
            (RoomCatalog::Fixed(rooms), None) => rooms[0].clone(),
            (RoomCatalog::Fixed(rooms), Some(raw)) => rooms
                .iter()
                .find(|r| fold(r) == fold(raw.trim()))
                .cloned()
                .ok_or(ConfigError::DefaultRoomNotInCatalog(raw))?,
        };

        let entry = parse_choice(
            &lookup,
            "COVE_ENTRY",
            EntryMode::DefaultRoom,
            &[("default", EntryMode::DefaultRoom), ("select", EntryMode::SelectRoom)],
        )?;
        let leave = parse_choice(
            &lookup,
            "COVE_LEAVE",
            LeaveMode::Lobby,
            &[("lobby", LeaveMode::Lobby), ("default", LeaveMode::DefaultRoom)],
        )?;
        let announce = parse_choice(
            &lookup,
            "COVE_ANNOUNCE",
            AnnounceScope::Room,
            &[("room", AnnounceScope::Room), ("global", AnnounceScope::Global)],
        )?;
        let chat_style = parse_choice(
            &lookup,
            "COVE_CHAT_STYLE",
            ChatStyle::Colon,
            &[("colon", ChatStyle::Colon), ("arrow", ChatStyle::Arrow)],
        )?;

        Ok(Self {
            bind,
            catalog,
            default_room,
            entry,
            leave,
            announce,
            chat_style,
        })
    }
}
