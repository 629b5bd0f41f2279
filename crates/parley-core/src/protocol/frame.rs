//! FrameCodec -- encode/decode of gateway text frames.
//!
//! The gateway speaks an engine.io/socket.io style text protocol. Every
//! inbound frame is classified by a single ordered match into a [`Frame`];
//! decoding never fails, anything unexpected becomes
//! [`Frame::Unrecognized`] carrying the raw text for the caller to log.
//!
//! | Literal | Frame |
//! |---|---|
//! | `0{...}` | [`Frame::Handshake`] |
//! | `2` | [`Frame::Heartbeat`] |
//! | `40/<ns>,{"sid":"..."}` | [`Frame::NamespaceAck`] |
//! | `44/<ns>,{"message":"..."}` | [`Frame::NamespaceError`] |
//! | `42/<ns>,["message","..."]` | [`Frame::PlainMessage`] |
//! | `42/<ns>,["<name>",<json>]` | [`Frame::Event`] |

use std::time::Duration;

use parley_types::message::ContentKind;
use serde::Deserialize;
use serde_json::Value;

/// Outbound heartbeat reply.
pub const PONG: &str = "3";

/// Inbound heartbeat ping.
pub const PING: &str = "2";

/// Event name of inbound chat message deliveries.
pub const MESSAGE_EVENT: &str = "msg";

/// Event name of inbound status notices.
pub const NOTICE_EVENT: &str = "message";

/// Event name of outbound chat sends.
pub const SEND_EVENT: &str = "send";

/// Session descriptor carried by the transport handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeInfo {
    #[serde(default)]
    pub sid: Option<String>,
    /// Milliseconds between server pings.
    #[serde(default)]
    pub ping_interval: Option<u64>,
    #[serde(default)]
    pub ping_timeout: Option<u64>,
}

impl HandshakeInfo {
    /// Longest silence tolerated before the link counts as dead:
    /// `pingInterval + pingTimeout`, when the gateway announced an interval.
    pub fn liveness_window(&self) -> Option<Duration> {
        let interval = self.ping_interval.filter(|ms| *ms > 0)?;
        let timeout = self.ping_timeout.unwrap_or(0);
        Some(Duration::from_millis(interval.saturating_add(timeout)))
    }
}

/// One decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Handshake(HandshakeInfo),
    Heartbeat,
    NamespaceAck { sid: Option<String> },
    /// The gateway refused the namespace connect (usually a bad token).
    NamespaceError(String),
    Event { name: String, payload: Value },
    /// Status notice text (`["message","..."]`).
    PlainMessage(String),
    Unrecognized(String),
}

#[derive(Deserialize)]
struct AckBody {
    #[serde(default)]
    sid: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// Stateless codec bound to one namespace.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    namespace: String,
}

impl FrameCodec {
    pub fn new(namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        let namespace = namespace.trim_start_matches('/').to_string();
        Self { namespace }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Classify one inbound text frame.
    pub fn decode(&self, text: &str) -> Frame {
        let unrecognized = || Frame::Unrecognized(text.to_string());

        if text == PING {
            return Frame::Heartbeat;
        }

        if let Some(rest) = text.strip_prefix("40") {
            return match self.strip_namespace(rest) {
                Some(None) => Frame::NamespaceAck { sid: None },
                Some(Some(body)) => match serde_json::from_str::<AckBody>(body) {
                    Ok(ack) => Frame::NamespaceAck { sid: ack.sid },
                    Err(_) => unrecognized(),
                },
                None => unrecognized(),
            };
        }

        if let Some(rest) = text.strip_prefix("42") {
            return match self.strip_namespace(rest) {
                Some(Some(body)) => decode_event(body).unwrap_or_else(unrecognized),
                _ => unrecognized(),
            };
        }

        if let Some(rest) = text.strip_prefix("44") {
            return match self.strip_namespace(rest) {
                Some(None) => Frame::NamespaceError(String::new()),
                Some(Some(body)) => {
                    let message = serde_json::from_str::<ErrorBody>(body)
                        .ok()
                        .and_then(|b| b.message)
                        .unwrap_or_else(|| body.to_string());
                    Frame::NamespaceError(message)
                }
                None => unrecognized(),
            };
        }

        if let Some(rest) = text.strip_prefix('0') {
            if rest.starts_with('{') {
                if let Ok(info) = serde_json::from_str::<HandshakeInfo>(rest) {
                    return Frame::Handshake(info);
                }
            }
        }

        unrecognized()
    }

    /// `40/<ns>,{"isAdmin":false,"token":"<token>"}`
    pub fn encode_auth(&self, token: &str) -> String {
        format!(
            "40/{},{{\"isAdmin\":false,\"token\":{}}}",
            self.namespace,
            Value::from(token)
        )
    }

    /// `3`
    pub fn encode_pong(&self) -> &'static str {
        PONG
    }

    /// `42/<ns>,["send",{"sessionId":<id>,"content":{"type":"<type>","data":"<text>"}}]`
    pub fn encode_send(&self, session_id: i64, content: &str, kind: ContentKind) -> String {
        format!(
            "42/{},[\"{SEND_EVENT}\",{{\"sessionId\":{session_id},\"content\":{{\"type\":\"{kind}\",\"data\":{}}}}}]",
            self.namespace,
            Value::from(content)
        )
    }

    /// Strip `/<ns>` from the front of `rest`.
    ///
    /// Returns `Some(None)` for a bare namespace, `Some(Some(body))` for
    /// `/<ns>,body`, and `None` when the frame targets another namespace.
    fn strip_namespace<'a>(&self, rest: &'a str) -> Option<Option<&'a str>> {
        let after = rest.strip_prefix('/')?.strip_prefix(self.namespace.as_str())?;
        if after.is_empty() {
            Some(None)
        } else {
            after.strip_prefix(',').map(Some)
        }
    }
}

/// Decode the `[name, payload]` body of an event frame.
///
/// A numeric ack id may precede the array (`42/cs,7["msg",...]`).
fn decode_event(body: &str) -> Option<Frame> {
    let body = body.trim_start_matches(|c: char| c.is_ascii_digit());
    let mut parts = match serde_json::from_str::<Value>(body).ok()? {
        Value::Array(parts) => parts.into_iter(),
        _ => return None,
    };
    let name = match parts.next()? {
        Value::String(name) => name,
        _ => return None,
    };
    let payload = parts.next().unwrap_or(Value::Null);

    match (name.as_str(), payload) {
        (NOTICE_EVENT, Value::String(text)) => Some(Frame::PlainMessage(text)),
        (_, payload) => Some(Frame::Event { name, payload }),
    }
}
