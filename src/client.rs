/// Terminal client for the relay.
///
/// Setup is driven by the relay's prompt markers: name and room prompts are
/// answered from stdin until the welcome marker arrives, then the client
/// switches to free-form chat. `/quit` and `/exit` close the connection
/// locally and are never sent.
use std::io::Write;

use futures::SinkExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio_stream::StreamExt;
use tokio_util::codec::Framed;
use tracing::debug;

use crate::relay::codec::{CodecError, LineCodec};
use crate::relay::protocol::{NAME_PROMPT, QUIT_COMMANDS, ROOM_PROMPT, WELCOME_MARKER};

pub const DEFAULT_SERVER: &str = "localhost:8080";

/// Redraw prompt for chat mode.
const INPUT_PROMPT: &str = "You: ";

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("cannot connect to {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// What a line from the relay means during setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerLine {
    NamePrompt,
    RoomPrompt,
    Welcome,
    Other,
}

pub fn classify_server_line(line: &str) -> ServerLine {
    if line.contains(NAME_PROMPT) {
        ServerLine::NamePrompt
    } else if line.contains(ROOM_PROMPT) {
        ServerLine::RoomPrompt
    } else if line.contains(WELCOME_MARKER) {
        ServerLine::Welcome
    } else {
        ServerLine::Other
    }
}

/// What to do with a line typed by the user in chat mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Quit,
    Skip,
    Send(String),
}

pub fn classify_input(raw: &str) -> Input {
    let text = raw.trim();
    if text.is_empty() {
        Input::Skip
    } else if QUIT_COMMANDS.iter().any(|q| text.eq_ignore_ascii_case(q)) {
        Input::Quit
    } else {
        Input::Send(text.to_owned())
    }
}

/// Pick the server address: explicit argument, then `COVE_SERVER`, then the
/// default. A bare port means localhost.
pub fn resolve_server_addr(arg: Option<String>, env: Option<String>) -> String {
    let chosen = arg
        .or(env)
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty());
    match chosen {
        None => DEFAULT_SERVER.to_owned(),
        Some(addr) if !addr.contains(':') => format!("localhost:{addr}"),
        Some(addr) => addr,
    }
}

fn print_banner() {
    let rule = "=".repeat(50);
    println!("\n{rule}");
    println!("           CHAT");
    println!("{rule}");
    println!("Commands:");
    println!("  /join <room>  - Join a room");
    println!("  /leave        - Leave current room");
    println!("  /rooms        - List rooms");
    println!("  /users        - List users in room");
    println!("  /help         - Show help");
    println!("  /quit         - Quit");
    println!("{rule}");
}

/// Print an incoming line over the half-typed input, then redraw the prompt.
fn redraw(line: &str) -> std::io::Result<()> {
    let mut out = std::io::stdout().lock();
    write!(out, "\r\x1b[K{line}\n{INPUT_PROMPT}")?;
    out.flush()
}

fn prompt() -> std::io::Result<()> {
    let mut out = std::io::stdout().lock();
    write!(out, "{INPUT_PROMPT}")?;
    out.flush()
}

/// Connect to `addr` and run an interactive session on stdin/stdout.
pub async fn run(addr: &str) -> Result<(), ClientError> {
    println!("Connecting to {addr}...");
    let stream = TcpStream::connect(addr).await.map_err(|source| ClientError::Connect {
        addr: addr.to_owned(),
        source,
    })?;
    println!("Connected to server!");

    let mut framed = Framed::new(stream, LineCodec::new());
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    // Setup: answer prompts until the relay welcomes us.
    loop {
        let Some(frame) = framed.next().await else {
            println!("Server disconnected.");
            return Ok(());
        };
        let line = frame?;
        match classify_server_line(&line) {
            ServerLine::NamePrompt | ServerLine::RoomPrompt => {
                print!("{line} ");
                std::io::stdout().flush()?;
                let Some(answer) = input.next_line().await? else {
                    return Ok(());
                };
                framed.send(answer.trim().to_owned()).await?;
            }
            ServerLine::Welcome => {
                println!("{line}");
                break;
            }
            ServerLine::Other => println!("{line}"),
        }
    }

    print_banner();
    prompt()?;

    loop {
        tokio::select! {
            incoming = framed.next() => match incoming {
                Some(Ok(line)) => redraw(&line)?,
                Some(Err(e)) => return Err(e.into()),
                None => {
                    println!("\nServer disconnected.");
                    return Ok(());
                }
            },
            typed = input.next_line() => {
                let Some(raw) = typed? else {
                    debug!("stdin closed");
                    return Ok(());
                };
                match classify_input(&raw) {
                    Input::Quit => {
                        println!("Goodbye!");
                        return Ok(());
                    }
                    Input::Skip => prompt()?,
                    Input::Send(text) => {
                        framed.send(text).await?;
                        prompt()?;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::protocol::{self, EMPTY_NAME, TAKEN_NAME};

    #[test]
    fn recognises_setup_markers() {
        assert_eq!(classify_server_line(NAME_PROMPT), ServerLine::NamePrompt);
        assert_eq!(
            classify_server_line(&protocol::name_rejected(TAKEN_NAME)),
            ServerLine::NamePrompt
        );
        assert_eq!(
            classify_server_line(&protocol::name_rejected(EMPTY_NAME)),
            ServerLine::NamePrompt
        );
        assert_eq!(classify_server_line(ROOM_PROMPT), ServerLine::RoomPrompt);
        assert_eq!(
            classify_server_line(&protocol::welcome("alice", "general")),
            ServerLine::Welcome
        );
        assert_eq!(
            classify_server_line("[SERVER] Available rooms:"),
            ServerLine::Other
        );
    }

    #[test]
    fn quit_and_exit_stay_local() {
        assert_eq!(classify_input("/quit\n"), Input::Quit);
        assert_eq!(classify_input("  /exit "), Input::Quit);
        assert_eq!(classify_input("/QUIT"), Input::Quit);
    }

    #[test]
    fn blank_input_is_not_sent() {
        assert_eq!(classify_input(""), Input::Skip);
        assert_eq!(classify_input("   \t"), Input::Skip);
    }

    #[test]
    fn chat_and_commands_are_sent_trimmed() {
        assert_eq!(classify_input(" hello \n"), Input::Send("hello".into()));
        assert_eq!(
            classify_input("/join games"),
            Input::Send("/join games".into())
        );
    }

    #[test]
    fn server_address_resolution() {
        assert_eq!(resolve_server_addr(None, None), DEFAULT_SERVER);
        assert_eq!(resolve_server_addr(Some("9090".into()), None), "localhost:9090");
        assert_eq!(
            resolve_server_addr(Some("chat.example:7000".into()), Some("ignored:1".into())),
            "chat.example:7000"
        );
        assert_eq!(resolve_server_addr(None, Some("10.0.0.5:8080".into())), "10.0.0.5:8080");
        assert_eq!(resolve_server_addr(Some("  ".into()), None), DEFAULT_SERVER);
    }
}
