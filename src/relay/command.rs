/// Parsing of `/`-prefixed input lines into relay commands.
///
/// The line is split on whitespace; the first token, prefix included,
/// names the command. Command names are matched case-insensitively.
use super::protocol::COMMAND_PREFIX;

/// A recognised command with its validated arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Rooms,
    Join(String),
    Leave,
    Users,
    Help,
    /// `/quit` or `/exit` reaching the server (clients normally handle it).
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("empty command")]
    Empty,
    #[error("Usage: {0}")]
    Usage(&'static str),
    #[error("unknown command {0}")]
    Unknown(String),
}

/// True if `line` (already trimmed) should go to the dispatcher.
pub fn is_command(line: &str) -> bool {
    line.starts_with(COMMAND_PREFIX)
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let mut tokens = line.split_whitespace();
        let name = tokens.next().ok_or(CommandError::Empty)?;
        let args: Vec<&str> = tokens.collect();

        match name.to_lowercase().as_str() {
            "/rooms" => Ok(Command::Rooms),
            "/join" => match args.as_slice() {
                [room] => Ok(Command::Join((*room).to_owned())),
                _ => Err(CommandError::Usage("/join <room>")),
            },
            "/leave" => Ok(Command::Leave),
            "/users" => Ok(Command::Users),
            "/help" => Ok(Command::Help),
            "/quit" | "/exit" => Ok(Command::Quit),
            _ => Err(CommandError::Unknown(name.to_owned())),
        }
    }
}
