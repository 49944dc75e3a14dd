/// Connection registry: the single authority over live connections and
/// room membership.
///
/// All three maps live behind one `RwLock`. Every mutating operation holds the
/// write lock for its whole update, so other tasks only ever observe the maps
/// between operations, never halfway through one. Snapshots take the read
/// lock and copy out what they need; nothing here performs socket I/O.
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{mpsc, RwLock};
use tracing::info;

use super::config::{Config, EntryMode, LeaveMode, RoomCatalog};
use super::protocol::COMMAND_PREFIX;

/// Opaque identity of one accepted connection. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(u64);

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Sending half of a connection's outbound line queue.
pub type Outbound = mpsc::UnboundedSender<String>;

/// A registered connection.
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: ConnId,
    /// Display name, trimmed, unique case-insensitively.
    pub name: String,
    /// Current room, `None` while unassigned.
    pub room: Option<String>,
    pub addr: SocketAddr,
    pub tx: Outbound,
}

/// A delivery target copied out of the registry for broadcasting.
#[derive(Debug, Clone)]
pub struct Recipient {
    pub id: ConnId,
    pub name: String,
    pub tx: Outbound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum NameRejection {
    #[error("name is empty")]
    Empty,
    #[error("name is already taken")]
    Taken,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("no such room: {0}")]
    InvalidRoom(String),
    #[error("not in a room")]
    NotInRoom,
    #[error("already in room {0}")]
    AlreadyInRoom(String),
    #[error("connection is not registered")]
    UnknownConnection,
}

/// Result of a room move: where the connection was and where it is now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomChange {
    pub previous: Option<String>,
    pub current: Option<String>,
}

/// Validate the shape of a room name: trimmed, non-empty, a single token,
/// and not something that would be read as a command.
pub fn clean_room_name(candidate: &str) -> Option<&str> {
    let name = candidate.trim();
    if name.is_empty()
        || name.starts_with(COMMAND_PREFIX)
        || name.contains(char::is_whitespace)
    {
        return None;
    }
    Some(name)
}

/// Case-folded key used for name and room comparisons.
pub fn fold(name: &str) -> String {
    name.to_lowercase()
}

#[derive(Debug, Default)]
struct RegistryState {
    connections: HashMap<ConnId, Connection>,
    /// Room name → members. Empty rooms are pruned, except the default room.
    rooms: HashMap<String, HashSet<ConnId>>,
    /// Folded name → owner. Kept in lockstep with `connections`.
    names: HashMap<String, ConnId>,
}

#[derive(Debug)]
pub struct Registry {
    catalog: RoomCatalog,
    default_room: String,
    entry: EntryMode,
    leave: LeaveMode,
    next_id: AtomicU64,
    state: RwLock<RegistryState>,
}

impl Registry {
    pub fn new(config: &Config) -> Self {
        let mut state = RegistryState::default();
        state.rooms.insert(config.default_room.clone(), HashSet::new());
        Self {
            catalog: config.catalog.clone(),
            default_room: config.default_room.clone(),
            entry: config.entry,
            leave: config.leave,
            next_id: AtomicU64::new(1),
            state: RwLock::new(state),
        }
    }

    pub fn default_room(&self) -> &str {
        &self.default_room
    }

    pub fn catalog(&self) -> &RoomCatalog {
        &self.catalog
    }

    /// Map a user-supplied room name to the room it designates.
    ///
    /// Fixed catalogs match case-insensitively and return the catalog's own
    /// spelling. Dynamic catalogs accept any well-formed name as-is.
    pub fn resolve_room(&self, candidate: &str) -> Result<String, RegistryError> {
        let invalid = || RegistryError::InvalidRoom(candidate.trim().to_owned());
        let name = clean_room_name(candidate).ok_or_else(invalid)?;
        match &self.catalog {
            RoomCatalog::Dynamic => Ok(name.to_owned()),
            RoomCatalog::Fixed(rooms) => {
                let key = fold(name);
                rooms
                    .iter()
                    .find(|room| fold(room) == key)
                    .cloned()
                    .ok_or_else(invalid)
            }
        }
    }

    /// Reserve `candidate` and register the connection under it, atomically.
    ///
    /// The name is trimmed; uniqueness is case-insensitive. With
    /// [`EntryMode::DefaultRoom`] the connection starts in the default room,
    /// otherwise it starts unassigned.
    pub async fn register(
        &self,
        candidate: &str,
        addr: SocketAddr,
        tx: Outbound,
    ) -> Result<Connection, NameRejection> {
        let name = candidate.trim();
        if name.is_empty() {
            return Err(NameRejection::Empty);
        }
        let key = fold(name);

        let mut st = self.state.write().await;
        if st.names.contains_key(&key) {
            return Err(NameRejection::Taken);
        }

        let id = ConnId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let room = match self.entry {
            EntryMode::DefaultRoom => Some(self.default_room.clone()),
            EntryMode::SelectRoom => None,
        };
        if let Some(ref room) = room {
            st.rooms.entry(room.clone()).or_default().insert(id);
        }
        let conn = Connection {
            id,
            name: name.to_owned(),
            room,
            addr,
            tx,
        };
        st.names.insert(key, id);
        st.connections.insert(id, conn.clone());

        info!(conn = %id, name, total = st.connections.len(), "registered");
        Ok(conn)
    }

    /// Move a connection into `candidate`, leaving its previous room.
    pub async fn join_room(
        &self,
        id: ConnId,
        candidate: &str,
    ) -> Result<RoomChange, RegistryError> {
        let room = self.resolve_room(candidate)?;
        let mut st = self.state.write().await;
        let current = st
            .connections
            .get(&id)
            .ok_or(RegistryError::UnknownConnection)?
            .room
            .clone();
        if current.as_deref() == Some(room.as_str()) {
            return Err(RegistryError::AlreadyInRoom(room));
        }
        Ok(self.move_member(&mut st, id, Some(room)))
    }

    /// Leave the current room: to the lobby or back to the default room,
    /// depending on [`LeaveMode`].
    pub async fn leave_room(&self, id: ConnId) -> Result<RoomChange, RegistryError> {
        let mut st = self.state.write().await;
        let current = st
            .connections
            .get(&id)
            .ok_or(RegistryError::UnknownConnection)?
            .room
            .clone();
        let target = match (self.leave, current) {
            (LeaveMode::Lobby, None) => return Err(RegistryError::NotInRoom),
            (LeaveMode::Lobby, Some(_)) => None,
            (LeaveMode::DefaultRoom, Some(room)) if room == self.default_room => {
                return Err(RegistryError::AlreadyInRoom(room));
            }
            (LeaveMode::DefaultRoom, _) => Some(self.default_room.clone()),
        };
        Ok(self.move_member(&mut st, id, target))
    }

    /// Relocate `id` to `target`. Caller holds the write lock and has
    /// checked that `id` is registered.
    fn move_member(
        &self,
        st: &mut RegistryState,
        id: ConnId,
        target: Option<String>,
    ) -> RoomChange {
        let previous = st
            .connections
            .get_mut(&id)
            .and_then(|conn| std::mem::replace(&mut conn.room, target.clone()));

        if let Some(ref old) = previous {
            self.remove_from_room(st, old, id);
        }
        if let Some(ref new) = target {
            st.rooms.entry(new.clone()).or_default().insert(id);
        }

        info!(conn = %id, from = ?previous, to = ?target, "room change");
        RoomChange {
            previous,
            current: target,
        }
    }

    fn remove_from_room(&self, st: &mut RegistryState, room: &str, id: ConnId) {
        let now_empty = match st.rooms.get_mut(room) {
            Some(members) => {
                members.remove(&id);
                members.is_empty()
            }
            None => false,
        };
        if now_empty && room != self.default_room {
            st.rooms.remove(room);
        }
    }

    /// Remove a connection entirely. Returns the removed record the first
    /// time; later calls for the same handle return `None`.
    pub async fn unregister(&self, id: ConnId) -> Option<Connection> {
        let mut st = self.state.write().await;
        let conn = st.connections.remove(&id)?;
        if let Some(ref room) = conn.room {
            self.remove_from_room(&mut st, room, id);
        }
        let key = fold(&conn.name);
        if st.names.get(&key) == Some(&id) {
            st.names.remove(&key);
        }
        info!(conn = %id, name = %conn.name, total = st.connections.len(), "unregistered");
        Some(conn)
    }

    /// Current record for `id`, if registered.
    pub async fn connection(&self, id: ConnId) -> Option<Connection> {
        self.state.read().await.connections.get(&id).cloned()
    }

    pub async fn connection_count(&self) -> usize {
        self.state.read().await.connections.len()
    }

    /// Sorted display names of everyone in `room`.
    pub async fn room_members(&self, room: &str) -> Vec<String> {
        let st = self.state.read().await;
        let mut names: Vec<String> = st
            .rooms
            .get(room)
            .into_iter()
            .flatten()
            .filter_map(|id| st.connections.get(id))
            .map(|conn| conn.name.clone())
            .collect();
        names.sort_by_key(|name| fold(name));
        names
    }

    /// Rooms with their member counts.
    ///
    /// Fixed catalogs list every catalog room in catalog order. Dynamic
    /// catalogs list the rooms that currently exist, sorted by name.
    pub async fn room_catalog(&self) -> Vec<(String, usize)> {
        let st = self.state.read().await;
        let count = |room: &str| st.rooms.get(room).map_or(0, HashSet::len);
        match &self.catalog {
            RoomCatalog::Fixed(rooms) => rooms.iter().map(|r| (r.clone(), count(r))).collect(),
            RoomCatalog::Dynamic => {
                let mut rooms: Vec<(String, usize)> = st
                    .rooms
                    .iter()
                    .map(|(room, members)| (room.clone(), members.len()))
                    .collect();
                rooms.sort_by(|a, b| a.0.cmp(&b.0));
                rooms
            }
        }
    }

    /// Snapshot of the members of `room`, minus `exclude`.
    pub async fn room_recipients(&self, room: &str, exclude: Option<ConnId>) -> Vec<Recipient> {
        let st = self.state.read().await;
        st.rooms
            .get(room)
            .into_iter()
            .flatten()
            .filter(|id| Some(**id) != exclude)
            .filter_map(|id| st.connections.get(id))
            .map(Recipient::from)
            .collect()
    }

    /// Snapshot of every registered connection, minus `exclude`.
    pub async fn all_recipients(&self, exclude: Option<ConnId>) -> Vec<Recipient> {
        let st = self.state.read().await;
        st.connections
            .values()
            .filter(|conn| Some(conn.id) != exclude)
            .map(Recipient::from)
            .collect()
    }
}

impl From<&Connection> for Recipient {
    fn from(conn: &Connection) -> Self {
        Self {
            id: conn.id,
            name: conn.name.clone(),
            tx: conn.tx.clone(),
        }
    }
}
