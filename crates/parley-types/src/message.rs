//! Chat message types for Parley.
//!
//! A `ChatMessage` is one entry in a customer-service conversation, either
//! delivered live by the gateway or fetched as part of a history page. The
//! serde representation matches the gateway's JSON (camelCase keys).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

/// Who authored a message, from the customer's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageDirection {
    /// Written by the service agent.
    #[serde(alias = "agent")]
    Inbound,
    /// Written by the customer.
    #[serde(alias = "user")]
    Outbound,
}

impl fmt::Display for MessageDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageDirection::Inbound => write!(f, "inbound"),
            MessageDirection::Outbound => write!(f, "outbound"),
        }
    }
}

/// Read receipt status of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadStatus {
    Unread,
    Read,
}

impl Default for ReadStatus {
    fn default() -> Self {
        ReadStatus::Unread
    }
}

/// Content type carried by an outbound send frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Text,
    Image,
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentKind::Text => write!(f, "text"),
            ContentKind::Image => write!(f, "image"),
        }
    }
}

impl FromStr for ContentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(ContentKind::Text),
            "image" => Ok(ContentKind::Image),
            other => Err(format!("invalid content kind: '{other}'")),
        }
    }
}

impl Default for ContentKind {
    fn default() -> Self {
        ContentKind::Text
    }
}

/// A single message within a chat session.
///
/// Identity is `id`. Apart from `status` (Unread -> Read through a batch
/// mark-as-read) a message is never modified after it enters a timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: i64,
    pub session_id: i64,
    #[serde(rename = "type")]
    pub direction: MessageDirection,
    pub content: String,
    #[serde(default)]
    pub status: ReadStatus,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn is_unread(&self) -> bool {
        self.status == ReadStatus::Unread
    }
}

/// Result of creating a chat session with the session repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub session_id: i64,
}
