//! Terminal rendering of chat messages and session status.

use chrono::Local;
use console::style;
use parley_core::chat::{ChatView, SessionPhase};
use parley_types::connection::ConnectionState;
use parley_types::message::{ChatMessage, MessageDirection};
use parley_types::page::LoadMoreState;

/// One message line: `  10:42 agent  text`, with a marker on unread
/// agent messages.
pub fn message_line(message: &ChatMessage) -> String {
    let time = message.created_at.with_timezone(&Local).format("%H:%M");
    let who = match message.direction {
        MessageDirection::Inbound => style("agent").cyan().bold(),
        MessageDirection::Outbound => style("you").green().bold(),
    };
    let marker = if message.is_unread() && message.direction == MessageDirection::Inbound {
        style("*").yellow().bold().to_string()
    } else {
        " ".to_string()
    };
    format!("{marker} {} {who:<5}  {}", style(time).dim(), message.content)
}

pub fn connection_line(state: &ConnectionState) -> String {
    let label = match state {
        ConnectionState::Connected => style("connected").green(),
        ConnectionState::Connecting => style("connecting...").yellow(),
        ConnectionState::Disconnected => style("disconnected").dim(),
        ConnectionState::Error(_) => style("connection lost").red(),
    };
    match state {
        ConnectionState::Error(reason) => format!(
            "  {} {label} ({}) -- /retry to reconnect",
            style("~").dim(),
            style(reason).dim()
        ),
        _ => format!("  {} {label}", style("~").dim()),
    }
}

/// Status line for the "older messages" affordance, if worth showing.
pub fn load_more_line(state: LoadMoreState) -> Option<String> {
    match state {
        LoadMoreState::NoMore => Some(format!("  {}", style("-- beginning of conversation --").dim())),
        LoadMoreState::Error => Some(format!(
            "  {} could not load history -- /retry to try again",
            style("!").red().bold()
        )),
        LoadMoreState::PullToLoad | LoadMoreState::Success | LoadMoreState::Loading => None,
    }
}

pub fn status_block(view: &ChatView) -> String {
    let phase = match &view.phase {
        SessionPhase::Failed(_) => style(view.phase.to_string()).red(),
        SessionPhase::Active(_) => style(view.phase.to_string()).green(),
        _ => style(view.phase.to_string()).yellow(),
    };
    let unread = view
        .messages
        .iter()
        .filter(|m| m.is_unread() && m.direction == MessageDirection::Inbound)
        .count();
    format!(
        "\n  {}  {phase}\n  {}  {}\n  {}  {} loaded, {unread} unread ({:?})\n",
        style("Session:").bold(),
        style("Socket:").bold(),
        view.connection,
        style("History:").bold(),
        view.messages.len(),
        view.load_more,
    )
}

pub fn banner(session_id: i64, gateway: &str) -> String {
    format!(
        "\n  {} {}\n  {}  {}\n  {}  {}\n\n  {}\n  {}\n",
        style("*").cyan().bold(),
        style("Parley customer service").cyan().bold(),
        style("Session:").bold(),
        style(session_id).dim(),
        style("Gateway:").bold(),
        style(gateway).dim(),
        style("Type /help for commands, Ctrl+D to exit").dim(),
        style("---").dim(),
    )
}
