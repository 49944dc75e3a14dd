/// Per-connection session: name negotiation, room selection, message loop,
/// teardown.
///
/// A session only ever talks to other connections through the registry and
/// the broadcaster. Lines queued for it by other sessions arrive on its
/// outbound channel and are written out from the same `select!` loop that
/// reads its input.
use std::net::SocketAddr;

use futures::SinkExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_util::codec::Framed;
use tracing::{debug, info};

use super::broadcast;
use super::codec::{CodecError, LineCodec};
use super::command::is_command;
use super::config::AnnounceScope;
use super::dispatch::{self, CommandResult};
use super::protocol::{
    self, notice, EMPTY_NAME, NAME_PROMPT, QUIT_COMMANDS, ROOM_PROMPT, TAKEN_NAME,
};
use super::registry::{ConnId, Connection, NameRejection, RegistryError};
use super::server::{ServerState, SharedState};

type LineStream<S> = Framed<S, LineCodec>;

/// Where a registered session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Registered, waiting for a valid room choice.
    SelectingRoom,
    /// Relaying chat and commands.
    Chatting,
}

/// What the session loop should do after handling one input line.
enum Flow {
    Continue,
    Quit,
}

/// Drive one connection from accept to close.
///
/// Transport errors end the session and are returned for logging. Once a
/// name has been committed the connection is always unregistered on the way
/// out, whatever ended the session.
pub async fn handle_client<S>(
    stream: S,
    addr: SocketAddr,
    state: SharedState,
) -> Result<(), CodecError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut framed = Framed::new(stream, LineCodec::new());
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let Some(conn) = negotiate_name(&mut framed, addr, &state, tx).await? else {
        debug!(%addr, "closed before choosing a name");
        return Ok(());
    };

    let result = run_registered(&mut framed, &mut rx, &conn, &state).await;
    teardown(&state, conn.id).await;
    result
}

/// Prompt for a name until one is accepted. `None` means the peer hung up.
async fn negotiate_name<S>(
    framed: &mut LineStream<S>,
    addr: SocketAddr,
    state: &ServerState,
    tx: mpsc::UnboundedSender<String>,
) -> Result<Option<Connection>, CodecError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    framed.send(NAME_PROMPT.to_owned()).await?;

    while let Some(frame) = framed.next().await {
        let candidate = frame?;
        match state.registry.register(&candidate, addr, tx.clone()).await {
            Ok(conn) => return Ok(Some(conn)),
            Err(NameRejection::Empty) => {
                framed.send(protocol::name_rejected(EMPTY_NAME)).await?;
            }
            Err(NameRejection::Taken) => {
                debug!(%addr, candidate = candidate.trim(), "name taken");
                framed.send(protocol::name_rejected(TAKEN_NAME)).await?;
            }
        }
    }
    Ok(None)
}

/// Everything between a committed name and the end of the connection.
async fn run_registered<S>(
    framed: &mut LineStream<S>,
    rx: &mut mpsc::UnboundedReceiver<String>,
    conn: &Connection,
    state: &ServerState,
) -> Result<(), CodecError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if state.config.announce == AnnounceScope::Global {
        broadcast::to_all(&state.registry, &protocol::connected(&conn.name), Some(conn.id)).await;
    }

    // Auto-joined connections skip room selection.
    let mut phase = match &conn.room {
        Some(room) => {
            enter_room(framed, conn, room, state).await?;
            Phase::Chatting
        }
        None => {
            send_room_prompt(framed, state).await?;
            Phase::SelectingRoom
        }
    };

    loop {
        tokio::select! {
            // Input from this connection.
            frame = framed.next() => {
                let line = match frame {
                    Some(Ok(line)) => line,
                    Some(Err(e)) => return Err(e),
                    None => return Ok(()),
                };
                let line = line.trim();

                let flow = match phase {
                    Phase::SelectingRoom => {
                        let (flow, chosen) = select_room(framed, conn, line, state).await?;
                        if chosen {
                            phase = Phase::Chatting;
                        }
                        flow
                    }
                    Phase::Chatting => handle_line(framed, conn, line, state).await?,
                };
                if let Flow::Quit = flow {
                    // Best effort; the peer may already be gone.
                    let _ = framed.send(notice("Goodbye!")).await;
                    return Ok(());
                }
            }

            // Lines queued by other sessions.
            Some(line) = rx.recv() => {
                framed.send(line).await?;
            }
        }
    }
}

/// Welcome a connection into `room` and tell the room about it.
async fn enter_room<S>(
    framed: &mut LineStream<S>,
    conn: &Connection,
    room: &str,
    state: &ServerState,
) -> Result<(), CodecError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    framed.send(protocol::welcome(&conn.name, room)).await?;
    framed.send(protocol::help_hint()).await?;
    // Arrivals are room-scoped under either announce scope.
    let arrival = protocol::joined_room(&conn.name, room);
    broadcast::to_room(&state.registry, room, &arrival, Some(conn.id)).await;
    info!(conn = %conn.id, name = %conn.name, room, "entered chat");
    Ok(())
}

async fn send_room_prompt<S>(
    framed: &mut LineStream<S>,
    state: &ServerState,
) -> Result<(), CodecError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    for line in dispatch::list_rooms(state, None).await {
        framed.send(line).await?;
    }
    framed.send(ROOM_PROMPT.to_owned()).await?;
    Ok(())
}

/// Handle one line during room selection. Returns the flow and whether a
/// room was joined.
async fn select_room<S>(
    framed: &mut LineStream<S>,
    conn: &Connection,
    line: &str,
    state: &ServerState,
) -> Result<(Flow, bool), CodecError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if QUIT_COMMANDS.iter().any(|q| line.eq_ignore_ascii_case(q)) {
        return Ok((Flow::Quit, false));
    }

    match state.registry.join_room(conn.id, line).await {
        Ok(change) => {
            let room = change.current.unwrap_or_default();
            enter_room(framed, conn, &room, state).await?;
            Ok((Flow::Continue, true))
        }
        Err(RegistryError::UnknownConnection) => Ok((Flow::Quit, false)),
        Err(_) => {
            framed.send(notice("Invalid room name, please try again.")).await?;
            send_room_prompt(framed, state).await?;
            Ok((Flow::Continue, false))
        }
    }
}

/// Handle one line in the message loop.
async fn handle_line<S>(
    framed: &mut LineStream<S>,
    conn: &Connection,
    line: &str,
    state: &ServerState,
) -> Result<Flow, CodecError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if line.is_empty() {
        return Ok(Flow::Continue);
    }

    if is_command(line) {
        return match dispatch::handle_command(state, conn.id, line).await {
            CommandResult::Reply(lines) => {
                for reply in lines {
                    framed.send(reply).await?;
                }
                Ok(Flow::Continue)
            }
            CommandResult::Quit => Ok(Flow::Quit),
        };
    }

    let Some(current) = state.registry.connection(conn.id).await else {
        return Ok(Flow::Quit);
    };
    match current.room {
        Some(room) => {
            let relayed = protocol::chat_line(state.config.chat_style, &room, &conn.name, line);
            broadcast::to_room(&state.registry, &room, &relayed, Some(conn.id)).await;
        }
        None => framed.send(protocol::not_in_room()).await?,
    }
    Ok(Flow::Continue)
}

/// Unregister `id` and announce the departure, once.
async fn teardown(state: &ServerState, id: ConnId) {
    let Some(conn) = state.registry.unregister(id).await else {
        return;
    };
    let line = protocol::disconnected(&conn.name);
    match (state.config.announce, conn.room) {
        (AnnounceScope::Global, _) => {
            broadcast::to_all(&state.registry, &line, None).await;
        }
        (AnnounceScope::Room, Some(room)) => {
            broadcast::to_room(&state.registry, &room, &line, None).await;
        }
        (AnnounceScope::Room, None) => {}
    }
}
