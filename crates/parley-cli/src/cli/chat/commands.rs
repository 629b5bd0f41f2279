//! Slash commands available inside a chat session.

use console::style;

#[derive(Debug, PartialEq, Eq)]
pub enum ChatCommand {
    Help,
    /// Load the next page of older messages.
    More,
    /// Reload the newest page.
    Refresh,
    /// Mark every unread agent message as read.
    Read,
    /// Recover from a failed session, connection or page load.
    Retry,
    /// Print session and connection status.
    Status,
    Quit,
    Unknown(String),
}

/// Parse `input` as a slash command, or `None` for a plain chat line.
pub fn parse(input: &str) -> Option<ChatCommand> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return None;
    }

    let name = trimmed
        .split_whitespace()
        .next()
        .unwrap_or(trimmed)
        .to_lowercase();

    Some(match name.as_str() {
        "/help" | "/h" | "/?" => ChatCommand::Help,
        "/more" | "/m" => ChatCommand::More,
        "/refresh" => ChatCommand::Refresh,
        "/read" => ChatCommand::Read,
        "/retry" | "/r" => ChatCommand::Retry,
        "/status" => ChatCommand::Status,
        "/quit" | "/exit" | "/q" => ChatCommand::Quit,
        _ => ChatCommand::Unknown(name),
    })
}

pub fn help_text() -> String {
    let rows = [
        ("/more", "load older messages"),
        ("/refresh", "reload the latest messages"),
        ("/read", "mark agent messages as read"),
        ("/retry", "retry whatever failed last"),
        ("/status", "show session and connection state"),
        ("/quit", "leave the chat (or Ctrl+D)"),
    ];
    let mut out = String::from("\n");
    for (name, about) in rows {
        out.push_str(&format!("  {:<10} {}\n", style(name).cyan(), style(about).dim()));
    }
    out
}
