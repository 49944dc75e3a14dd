//! cove: a line-oriented multi-room chat relay.
//!
//! Clients connect over TCP, pick a name and a room, and exchange text lines
//! that the relay fans out to the other occupants of the same room.

pub mod client;
pub mod relay;
