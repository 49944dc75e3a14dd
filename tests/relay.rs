/// End-to-end tests over loopback TCP.
///
/// Each test starts an in-process relay on an ephemeral port and drives it
/// with line-framed clients, the same way `cove-client` talks to it.
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::SinkExt;
use pretty_assertions::assert_eq;
use tokio::net::{TcpListener, TcpStream};
use tokio_stream::StreamExt;
use tokio_util::codec::Framed;

use cove::relay::codec::LineCodec;
use cove::relay::config::{AnnounceScope, ChatStyle, Config, EntryMode, RoomCatalog};
use cove::relay::protocol::{self, NAME_PROMPT, ROOM_PROMPT};
use cove::relay::server::{accept_loop, ServerState, SharedState};

type Client = Framed<TcpStream, LineCodec>;

/// Start a relay with `config` and return its address and state.
async fn start(config: Config) -> (SocketAddr, SharedState) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state: SharedState = Arc::new(ServerState::new(config));
    tokio::spawn(accept_loop(listener, Arc::clone(&state)));
    (addr, state)
}

async fn connect(addr: SocketAddr) -> Client {
    let stream = TcpStream::connect(addr).await.unwrap();
    Framed::new(stream, LineCodec::new())
}

async fn recv(client: &mut Client) -> String {
    tokio::time::timeout(Duration::from_secs(2), client.next())
        .await
        .expect("timed out waiting for a line")
        .expect("connection closed")
        .expect("codec error")
}

/// Assert nothing arrives for a short while.
async fn assert_silent(client: &mut Client) {
    let extra = tokio::time::timeout(Duration::from_millis(150), client.next()).await;
    assert!(extra.is_err(), "unexpected line: {extra:?}");
}

async fn send(client: &mut Client, line: &str) {
    client.send(line.to_owned()).await.unwrap();
}

/// Log in under default entry and consume the welcome lines.
async fn login(addr: SocketAddr, name: &str) -> Client {
    let mut client = connect(addr).await;
    assert_eq!(recv(&mut client).await, NAME_PROMPT);
    send(&mut client, name).await;
    let welcome = recv(&mut client).await;
    assert!(welcome.contains(protocol::WELCOME_MARKER), "got {welcome}");
    assert_eq!(recv(&mut client).await, protocol::help_hint());
    client
}

// ── Chat relay ──────────────────────────────────────────────────

#[tokio::test]
async fn two_users_chat_in_default_room() {
    let (addr, _state) = start(Config::default()).await;
    let mut alice = login(addr, "alice").await;
    let mut bob = login(addr, "bob").await;
    assert_eq!(recv(&mut alice).await, "[SERVER] bob joined room 'general'.");

    send(&mut alice, "hello").await;
    assert_eq!(recv(&mut bob).await, "[general] alice: hello");
    assert_silent(&mut alice).await;

    send(&mut bob, "hi alice").await;
    assert_eq!(recv(&mut alice).await, "[general] bob: hi alice");
}

#[tokio::test]
async fn arrow_style_chat_lines() {
    let (addr, _state) = start(Config {
        chat_style: ChatStyle::Arrow,
        ..Config::default()
    })
    .await;
    let mut alice = login(addr, "alice").await;
    let mut bob = login(addr, "bob").await;
    recv(&mut alice).await;

    send(&mut bob, "yo").await;
    assert_eq!(recv(&mut alice).await, "[general] bob > yo");
}

#[tokio::test]
async fn rooms_are_isolated() {
    let (addr, _state) = start(Config::default()).await;
    let mut alice = login(addr, "alice").await;
    let mut bob = login(addr, "bob").await;
    recv(&mut alice).await;

    send(&mut bob, "/join games").await;
    assert_eq!(recv(&mut bob).await, "[SERVER] You joined room 'games'.");
    assert_eq!(recv(&mut alice).await, "[SERVER] bob left room 'general'.");

    send(&mut bob, "anyone in games?").await;
    assert_silent(&mut alice).await;

    send(&mut alice, "general only").await;
    assert_silent(&mut bob).await;
}

// ── Lobby ───────────────────────────────────────────────────────

#[tokio::test]
async fn leave_puts_user_in_lobby() {
    let (addr, state) = start(Config::default()).await;
    let mut alice = login(addr, "alice").await;
    let mut bob = login(addr, "bob").await;
    recv(&mut alice).await;

    send(&mut bob, "/leave").await;
    assert_eq!(recv(&mut bob).await, "[SERVER] You left room 'general'.");
    assert_eq!(recv(&mut alice).await, "[SERVER] bob left room 'general'.");

    send(&mut alice, "still here").await;
    assert_silent(&mut bob).await;

    send(&mut bob, "anyone?").await;
    assert_eq!(recv(&mut bob).await, protocol::not_in_room());
    assert_silent(&mut alice).await;

    send(&mut alice, "/rooms").await;
    assert_eq!(recv(&mut alice).await, "[SERVER] Active rooms:");
    assert_eq!(recv(&mut alice).await, "  - general (1 user) <- you are here");
    assert_eq!(state.registry.room_members("general").await, vec!["alice"]);
}

// ── Names ───────────────────────────────────────────────────────

#[tokio::test]
async fn taken_name_is_reprompted() {
    let (addr, state) = start(Config::default()).await;
    let _alice = login(addr, "alice").await;

    let mut other = connect(addr).await;
    assert_eq!(recv(&mut other).await, NAME_PROMPT);
    send(&mut other, "alice").await;
    assert_eq!(
        recv(&mut other).await,
        "[SERVER] Username already taken. Enter your username:"
    );
    send(&mut other, "alice2").await;
    assert_eq!(recv(&mut other).await, protocol::welcome("alice2", "general"));

    assert_eq!(
        state.registry.room_members("general").await,
        vec!["alice", "alice2"]
    );
}

#[tokio::test]
async fn name_is_released_on_disconnect() {
    let (addr, state) = start(Config::default()).await;
    let alice = login(addr, "alice").await;
    drop(alice);

    // Teardown runs on the session task; poll until the name frees up.
    for _ in 0..50 {
        if state.registry.connection_count().await == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let _again = login(addr, "alice").await;
}

// ── Fixed catalog ───────────────────────────────────────────────

#[tokio::test]
async fn fixed_catalog_rejects_unknown_room() {
    let (addr, _state) = start(Config {
        catalog: RoomCatalog::Fixed(vec!["general".into(), "games".into()]),
        ..Config::default()
    })
    .await;
    let mut alice = login(addr, "alice").await;

    send(&mut alice, "/join nonexistent-room").await;
    assert_eq!(
        recv(&mut alice).await,
        "[SERVER] Invalid room name 'nonexistent-room'. Type /rooms to see the list."
    );

    send(&mut alice, "/join GAMES").await;
    assert_eq!(recv(&mut alice).await, "[SERVER] You joined room 'games'.");
}

#[tokio::test]
async fn select_entry_with_global_announcements() {
    let (addr, _state) = start(Config {
        catalog: RoomCatalog::Fixed(vec!["general".into(), "games".into()]),
        entry: EntryMode::SelectRoom,
        announce: AnnounceScope::Global,
        ..Config::default()
    })
    .await;

    let mut alice = connect(addr).await;
    recv(&mut alice).await;
    send(&mut alice, "alice").await;
    assert_eq!(recv(&mut alice).await, "[SERVER] Available rooms:");
    recv(&mut alice).await;
    recv(&mut alice).await;
    assert_eq!(recv(&mut alice).await, ROOM_PROMPT);
    send(&mut alice, "games").await;
    assert_eq!(recv(&mut alice).await, protocol::welcome("alice", "games"));
    recv(&mut alice).await;

    let mut bob = connect(addr).await;
    recv(&mut bob).await;
    send(&mut bob, "bob").await;
    assert_eq!(recv(&mut alice).await, protocol::connected("bob"));

    // Picking a room is still announced to that room.
    while recv(&mut bob).await != ROOM_PROMPT {}
    send(&mut bob, "games").await;
    assert_eq!(recv(&mut bob).await, protocol::welcome("bob", "games"));
    assert_eq!(recv(&mut alice).await, "[SERVER] bob joined room 'games'.");

    drop(bob);
    assert_eq!(recv(&mut alice).await, protocol::disconnected("bob"));
}

// ── Commands ────────────────────────────────────────────────────

#[tokio::test]
async fn help_and_unknown_commands() {
    let (addr, _state) = start(Config::default()).await;
    let mut alice = login(addr, "alice").await;

    send(&mut alice, "/help").await;
    assert_eq!(recv(&mut alice).await, "[SERVER] Available commands:");
    for _ in 1..protocol::HELP_LINES.len() {
        recv(&mut alice).await;
    }

    send(&mut alice, "/dance").await;
    assert_eq!(
        recv(&mut alice).await,
        "[SERVER] Unknown command: /dance. Type /help for available commands."
    );
}

#[tokio::test]
async fn quit_closes_the_connection() {
    let (addr, _state) = start(Config::default()).await;
    let mut alice = login(addr, "alice").await;

    send(&mut alice, "/exit").await;
    assert_eq!(recv(&mut alice).await, "[SERVER] Goodbye!");
    let end = tokio::time::timeout(Duration::from_secs(2), alice.next())
        .await
        .expect("timed out waiting for close");
    assert!(end.is_none());
}
