//! ChatTransport -- send/receive façade over the connection supervisor.
//!
//! Callers see chat-level operations only: `connect(token)`,
//! `send(session_id, content, kind) -> bool`, `disconnect()`, and three
//! subscription points (connection state, inbound chat messages, gateway
//! status notices). Frame encoding and heartbeat/ack handling stay below
//! this layer.

use std::sync::Arc;

use parley_types::connection::ConnectionState;
use parley_types::message::{ChatMessage, ContentKind};
use secrecy::SecretString;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::connection::{ConnectionSupervisor, Connector, SupervisorConfig, TokenCell};
use crate::event::EventBus;
use crate::protocol::frame::MESSAGE_EVENT;
use crate::protocol::{Frame, FrameCodec};

/// Chat-level façade owning one supervisor (and therefore one socket).
pub struct ChatTransport {
    supervisor: ConnectionSupervisor,
    codec: FrameCodec,
    tokens: Arc<TokenCell>,
    messages: EventBus<ChatMessage>,
    notices: EventBus<String>,
    pump: JoinHandle<()>,
}

impl ChatTransport {
    /// Build the transport and spawn its supervisor.
    ///
    /// Subscriptions are available immediately; nothing connects until
    /// [`connect`](Self::connect) is called.
    pub fn new<C: Connector>(connector: C, config: SupervisorConfig) -> Self {
        let tokens = Arc::new(TokenCell::new());
        let codec = FrameCodec::new(config.namespace.clone());
        let messages = EventBus::new(config.event_capacity);
        let notices = EventBus::new(config.event_capacity);

        let (supervisor, frames) = ConnectionSupervisor::spawn(connector, tokens.clone(), config);
        let pump = tokio::spawn(pump_frames(frames, messages.clone(), notices.clone()));

        Self {
            supervisor,
            codec,
            tokens,
            messages,
            notices,
            pump,
        }
    }

    /// Store `token` for this and every later (re)connect, then connect.
    ///
    /// A no-op on the socket if an attempt is already in progress.
    pub fn connect(&self, token: SecretString) {
        self.tokens.set(token);
        self.supervisor.connect();
    }

    /// Submit a chat message.
    ///
    /// Returns `false` when the connection is not `Connected`, in which case
    /// a reconnect is requested as recovery and nothing is transmitted.
    pub async fn send(&self, session_id: i64, content: &str, kind: ContentKind) -> bool {
        let frame = self.codec.encode_send(session_id, content, kind);
        if self.supervisor.send(frame).await {
            tracing::debug!(session_id, %kind, "chat message sent");
            return true;
        }
        tracing::info!(session_id, state = %self.supervisor.state(), "send refused, requesting reconnect");
        self.supervisor.connect();
        false
    }

    pub fn disconnect(&self) {
        self.supervisor.disconnect();
    }

    pub fn state(&self) -> ConnectionState {
        self.supervisor.state()
    }

    pub fn subscribe_state(&self) -> broadcast::Receiver<ConnectionState> {
        self.supervisor.subscribe_state()
    }

    /// Inbound chat messages, in arrival order.
    pub fn subscribe_messages(&self) -> broadcast::Receiver<ChatMessage> {
        self.messages.subscribe()
    }

    /// Gateway status notices (`["message", "..."]`).
    pub fn subscribe_notices(&self) -> broadcast::Receiver<String> {
        self.notices.subscribe()
    }
}

impl Drop for ChatTransport {
    fn drop(&mut self) {
        self.supervisor.disconnect();
        self.supervisor.shutdown();
        self.pump.abort();
    }
}

/// Route forwarded frames to the message and notice buses.
async fn pump_frames(
    mut frames: mpsc::Receiver<Frame>,
    messages: EventBus<ChatMessage>,
    notices: EventBus<String>,
) {
    while let Some(frame) = frames.recv().await {
        match frame {
            Frame::Event { name, payload } if name == MESSAGE_EVENT => {
                match serde_json::from_value::<ChatMessage>(payload.clone()) {
                    Ok(message) => messages.publish(message),
                    Err(err) => {
                        tracing::warn!(%payload, "dropping undecodable chat message: {err}");
                    }
                }
            }
            Frame::Event { name, .. } => {
                tracing::debug!(event = %name, "ignoring gateway event");
            }
            Frame::PlainMessage(text) => {
                tracing::debug!(notice = %text, "gateway notice");
                notices.publish(text);
            }
            other => {
                tracing::trace!(frame = ?other, "unexpected forwarded frame");
            }
        }
    }
}
