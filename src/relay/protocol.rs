/// Wire text shared by the relay and the terminal client.
///
/// The protocol is plain lines. Clients detect server intent by substring
/// markers, so the marker constants here must stay stable.
use super::config::ChatStyle;

/// Lines starting with this character are commands, not chat.
pub const COMMAND_PREFIX: char = '/';

/// Prefix of every line the relay itself originates.
pub const SERVER_TAG: &str = "[SERVER]";

/// Marker for "a name is being requested". Every rejection repeats it.
pub const NAME_PROMPT: &str = "Enter your username:";

/// Marker for "pick a room now" during room selection.
pub const ROOM_PROMPT: &str = "Choose a room to join:";

/// Marker for "setup is complete, switch to chat mode".
pub const WELCOME_MARKER: &str = "Welcome to the chat";

pub const EMPTY_NAME: &str = "Username cannot be empty.";
pub const TAKEN_NAME: &str = "Username already taken.";

/// Commands the client handles locally; never relayed as chat.
pub const QUIT_COMMANDS: [&str; 2] = ["/quit", "/exit"];

/// A notice from the relay: `[SERVER] <text>`.
pub fn notice(text: impl AsRef<str>) -> String {
    format!("{SERVER_TAG} {}", text.as_ref())
}

/// A relayed chat line for a room.
pub fn chat_line(style: ChatStyle, room: &str, sender: &str, text: &str) -> String {
    match style {
        ChatStyle::Colon => format!("[{room}] {sender}: {text}"),
        ChatStyle::Arrow => format!("[{room}] {sender} > {text}"),
    }
}

pub fn name_rejected(reason: &str) -> String {
    notice(format!("{reason} {NAME_PROMPT}"))
}

pub fn welcome(name: &str, room: &str) -> String {
    notice(format!("{WELCOME_MARKER}, {name}! You are in room '{room}'."))
}

pub fn help_hint() -> String {
    notice("Type /help for available commands.")
}

pub fn joined_room(name: &str, room: &str) -> String {
    notice(format!("{name} joined room '{room}'."))
}

pub fn left_room(name: &str, room: &str) -> String {
    notice(format!("{name} left room '{room}'."))
}

pub fn connected(name: &str) -> String {
    notice(format!("{name} connected to the server."))
}

pub fn disconnected(name: &str) -> String {
    notice(format!("{name} disconnected."))
}

pub fn not_in_room() -> String {
    notice("You are not in a room. Use /join <room> to start chatting.")
}

pub fn member_count(count: usize) -> String {
    if count == 1 {
        "1 user".to_owned()
    } else {
        format!("{count} users")
    }
}

/// Static command reference sent for `/help`.
pub const HELP_LINES: [&str; 7] = [
    "Available commands:",
    "  /join <room>  - Join a room",
    "  /leave        - Leave your current room",
    "  /rooms        - List rooms",
    "  /users        - List users in your room",
    "  /help         - Show this help message",
    "  /quit         - Disconnect from the server",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_line_templates() {
        assert_eq!(
            chat_line(ChatStyle::Colon, "general", "alice", "hello"),
            "[general] alice: hello"
        );
        assert_eq!(
            chat_line(ChatStyle::Arrow, "games", "bob", "gg"),
            "[games] bob > gg"
        );
    }

    #[test]
    fn rejections_repeat_the_name_prompt() {
        assert!(name_rejected(EMPTY_NAME).contains(NAME_PROMPT));
        assert!(name_rejected(TAKEN_NAME).contains(NAME_PROMPT));
        assert!(name_rejected(TAKEN_NAME).starts_with(SERVER_TAG));
    }

    #[test]
    fn welcome_carries_marker() {
        let line = welcome("alice", "general");
        assert!(line.contains(WELCOME_MARKER));
        assert!(line.contains("'general'"));
    }

    #[test]
    fn member_count_pluralises() {
        assert_eq!(member_count(0), "0 users");
        assert_eq!(member_count(1), "1 user");
        assert_eq!(member_count(3), "3 users");
    }
}
