//! ConnectionSupervisor -- owns the gateway socket and its state machine.
//!
//! The supervisor is an actor: one task serializes public commands
//! (connect, send, disconnect), socket events and reconnect timers through a
//! single `tokio::select!` loop, so `ConnectionState` is only ever mutated
//! in one place.
//!
//! ```text
//! Disconnected --connect--> Connecting --ack--> Connected
//!       ^                       |                   |
//!       |                    failure             failure
//!   disconnect                  v                   v
//!       +------------------- Error(reason) <--------+
//!                               | retry_count < max_retries
//!                               +--(retry_count x base_delay)--> Connecting
//! ```
//!
//! Each socket attempt runs in a "link" task tagged with a generation
//! number. Tearing a link down bumps the generation, so events still queued
//! from a dead or cancelled link are recognised as stale and dropped.
//!
//! Once the handshake announces `pingInterval`/`pingTimeout`, the link must
//! deliver some frame within their sum; silence past that deadline is
//! treated as a lost socket.

use std::sync::Arc;
use std::time::Duration;

use parley_types::config::GatewayConfig;
use parley_types::connection::ConnectionState;
use parley_types::error::TransportError;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::socket::{Connector, SocketReader, SocketWriter};
use super::token::TokenProvider;
use crate::event::EventBus;
use crate::protocol::{Frame, FrameCodec};

/// Status notice text that confirms the session, alternative to the ack.
const SUCCESS_MARKER: &str = "success";

/// Upper bound on waiting for a close handshake while tearing down.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Tunables for one supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub url: String,
    pub namespace: String,
    pub max_retries: u32,
    pub base_delay: Duration,
    /// Capacity of the state broadcast and the forwarded-frame queue.
    pub event_capacity: usize,
}

impl SupervisorConfig {
    pub fn from_gateway(gateway: &GatewayConfig, event_capacity: usize) -> Self {
        Self {
            url: gateway.url.clone(),
            namespace: gateway.namespace.clone(),
            max_retries: gateway.max_retries,
            base_delay: Duration::from_millis(gateway.base_delay_ms),
            event_capacity,
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self::from_gateway(&GatewayConfig::default(), 256)
    }
}

enum Command {
    Connect,
    Send {
        frame: String,
        reply: oneshot::Sender<bool>,
    },
    Disconnect,
}

enum LinkEvent<W> {
    Opened {
        generation: u64,
        writer: W,
        token: SecretString,
    },
    OpenFailed {
        generation: u64,
        error: TransportError,
    },
    Frame {
        generation: u64,
        text: String,
    },
    Lost {
        generation: u64,
        error: TransportError,
    },
    RetryDue {
        generation: u64,
    },
}

impl<W> LinkEvent<W> {
    fn generation(&self) -> u64 {
        match self {
            LinkEvent::Opened { generation, .. }
            | LinkEvent::OpenFailed { generation, .. }
            | LinkEvent::Frame { generation, .. }
            | LinkEvent::Lost { generation, .. }
            | LinkEvent::RetryDue { generation } => *generation,
        }
    }
}

/// Handle to a running supervisor actor.
///
/// Dropping the handle shuts the actor down and closes the socket.
pub struct ConnectionSupervisor {
    commands: mpsc::UnboundedSender<Command>,
    state_bus: EventBus<ConnectionState>,
    state: watch::Receiver<ConnectionState>,
    shutdown: CancellationToken,
}

impl ConnectionSupervisor {
    /// Spawn the actor on the current tokio runtime.
    ///
    /// Returns the handle and the receiver of application frames
    /// ([`Frame::Event`] and [`Frame::PlainMessage`]); protocol frames are
    /// handled internally and never forwarded. Both channels exist before
    /// any socket is opened, so no frame can be missed.
    pub fn spawn<C: Connector>(
        connector: C,
        tokens: Arc<dyn TokenProvider>,
        config: SupervisorConfig,
    ) -> (Self, mpsc::Receiver<Frame>) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (links_tx, links_rx) = mpsc::unbounded_channel();
        let (frames_tx, frames_rx) = mpsc::channel(config.event_capacity.max(1));
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let state_bus = EventBus::new(config.event_capacity);
        let shutdown = CancellationToken::new();

        let actor = Actor {
            connector: Arc::new(connector),
            tokens,
            codec: FrameCodec::new(config.namespace.clone()),
            config,
            state: ConnectionState::Disconnected,
            state_bus: state_bus.clone(),
            state_tx,
            frames_tx,
            links_tx,
            writer: None,
            link_task: None,
            retry_timer: None,
            liveness: None,
            liveness_deadline: None,
            generation: 0,
            retry_count: 0,
            shutdown: shutdown.clone(),
        };
        tokio::spawn(actor.run(commands_rx, links_rx));

        let handle = Self {
            commands: commands_tx,
            state_bus,
            state: state_rx,
            shutdown,
        };
        (handle, frames_rx)
    }

    /// Request a connection. Ignored unless `Disconnected` or `Error`.
    pub fn connect(&self) {
        let _ = self.commands.send(Command::Connect);
    }

    /// Close the socket, cancel any pending reconnect and go `Disconnected`.
    pub fn disconnect(&self) {
        let _ = self.commands.send(Command::Disconnect);
    }

    /// Write a raw frame. Returns `false` unless the state is `Connected`
    /// and the write succeeded.
    pub async fn send(&self, frame: String) -> bool {
        let (reply, rx) = oneshot::channel();
        if self.commands.send(Command::Send { frame, reply }).is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Current state snapshot.
    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    /// Receive every subsequent state transition, once each.
    pub fn subscribe_state(&self) -> broadcast::Receiver<ConnectionState> {
        self.state_bus.subscribe()
    }

    /// Stop the actor. The socket is closed and the state ends `Disconnected`.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for ConnectionSupervisor {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl std::fmt::Debug for ConnectionSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSupervisor")
            .field("state", &*self.state.borrow())
            .finish()
    }
}

struct Actor<C: Connector> {
    connector: Arc<C>,
    tokens: Arc<dyn TokenProvider>,
    codec: FrameCodec,
    config: SupervisorConfig,
    state: ConnectionState,
    state_bus: EventBus<ConnectionState>,
    state_tx: watch::Sender<ConnectionState>,
    frames_tx: mpsc::Sender<Frame>,
    links_tx: mpsc::UnboundedSender<LinkEvent<C::Writer>>,
    writer: Option<C::Writer>,
    link_task: Option<JoinHandle<()>>,
    retry_timer: Option<CancellationToken>,
    /// Silence allowed on the current link, from its handshake.
    liveness: Option<Duration>,
    /// When the current link is declared dead if nothing arrives.
    liveness_deadline: Option<Instant>,
    /// Identifies the current link; bumped whenever a link is torn down.
    generation: u64,
    retry_count: u32,
    shutdown: CancellationToken,
}

impl<C: Connector> Actor<C> {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut links: mpsc::UnboundedReceiver<LinkEvent<C::Writer>>,
    ) {
        loop {
            let deadline = self.liveness_deadline;
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                Some(event) = links.recv() => self.handle_link_event(event).await,
                _ = sleep_until_deadline(deadline), if deadline.is_some() => {
                    tracing::warn!("no frame from gateway within ping timeout");
                    self.link_failed(TransportError::Io("ping timeout".to_string())).await;
                }
            }
        }

        self.cancel_retry_timer();
        self.drop_link().await;
        self.set_state(ConnectionState::Disconnected);
        tracing::debug!("connection supervisor stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect => {
                if !self.state.can_connect() {
                    tracing::debug!(state = %self.state, "connect ignored, attempt already active");
                    return;
                }
                self.retry_count = 0;
                self.start_attempt().await;
            }
            Command::Send { frame, reply } => {
                let sent = self.send_frame(&frame).await;
                let _ = reply.send(sent);
            }
            Command::Disconnect => {
                self.cancel_retry_timer();
                self.drop_link().await;
                self.retry_count = 0;
                self.set_state(ConnectionState::Disconnected);
            }
        }
    }

    async fn handle_link_event(&mut self, event: LinkEvent<C::Writer>) {
        if event.generation() != self.generation {
            tracing::trace!(
                generation = event.generation(),
                current = self.generation,
                "discarding stale link event"
            );
            if let LinkEvent::Opened { mut writer, .. } = event {
                writer.close().await;
            }
            return;
        }

        match event {
            LinkEvent::Opened { writer, token, .. } => {
                tracing::debug!(namespace = self.codec.namespace(), "socket open, authenticating");
                self.writer = Some(writer);
                let auth = self.codec.encode_auth(token.expose_secret());
                if let Some(writer) = self.writer.as_mut() {
                    if let Err(error) = writer.send(&auth).await {
                        self.link_failed(error).await;
                    }
                }
            }
            LinkEvent::OpenFailed { error, .. } | LinkEvent::Lost { error, .. } => {
                self.link_failed(error).await;
            }
            LinkEvent::Frame { text, .. } => {
                if let Some(window) = self.liveness {
                    self.liveness_deadline = Some(Instant::now() + window);
                }
                self.handle_frame(text).await
            }
            LinkEvent::RetryDue { .. } => {
                self.retry_timer = None;
                if matches!(self.state, ConnectionState::Error(_)) {
                    tracing::info!(
                        attempt = self.retry_count,
                        max = self.config.max_retries,
                        "reconnecting to gateway"
                    );
                    self.start_attempt().await;
                }
            }
        }
    }

    async fn handle_frame(&mut self, text: String) {
        match self.codec.decode(&text) {
            Frame::Heartbeat => {
                if let Some(writer) = self.writer.as_mut() {
                    if let Err(error) = writer.send(self.codec.encode_pong()).await {
                        tracing::warn!("failed to answer heartbeat: {error}");
                    }
                }
            }
            Frame::Handshake(info) => {
                tracing::debug!(
                    sid = info.sid.as_deref().unwrap_or("-"),
                    ping_interval = ?info.ping_interval,
                    ping_timeout = ?info.ping_timeout,
                    "gateway handshake"
                );
                self.liveness = info.liveness_window();
                self.liveness_deadline = self.liveness.map(|window| Instant::now() + window);
            }
            Frame::NamespaceAck { sid } => {
                if self.state == ConnectionState::Connecting {
                    tracing::debug!(sid = sid.as_deref().unwrap_or("-"), "namespace acknowledged");
                    self.mark_connected();
                }
            }
            Frame::NamespaceError(message) => {
                tracing::warn!(%message, "gateway refused namespace connect");
                self.link_failed(TransportError::Auth(message)).await;
            }
            Frame::PlainMessage(notice) => {
                if self.state == ConnectionState::Connecting
                    && notice.to_lowercase().contains(SUCCESS_MARKER)
                {
                    self.mark_connected();
                }
                self.forward(Frame::PlainMessage(notice));
            }
            frame @ Frame::Event { .. } => self.forward(frame),
            Frame::Unrecognized(raw) => {
                tracing::warn!(%raw, "dropping unrecognized gateway frame");
            }
        }
    }

    /// Hand an application frame to the transport without ever waiting on
    /// it: heartbeats and commands share this loop.
    fn forward(&self, frame: Frame) {
        match self.frames_tx.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(frame)) => {
                tracing::warn!(?frame, "frame queue full, dropping frame");
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!("frame receiver dropped, discarding frame");
            }
        }
    }

    fn mark_connected(&mut self) {
        self.retry_count = 0;
        self.set_state(ConnectionState::Connected);
    }

    async fn send_frame(&mut self, frame: &str) -> bool {
        if !self.state.is_connected() {
            return false;
        }
        let Some(writer) = self.writer.as_mut() else {
            return false;
        };
        match writer.send(frame).await {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!("gateway write failed: {error}");
                self.link_failed(error).await;
                false
            }
        }
    }

    /// Open a fresh link. The token is fetched inside the link task so a
    /// slow provider never stalls the actor.
    async fn start_attempt(&mut self) {
        self.cancel_retry_timer();
        self.drop_link().await;
        self.set_state(ConnectionState::Connecting);

        let generation = self.generation;
        let connector = self.connector.clone();
        let tokens = self.tokens.clone();
        let url = self.config.url.clone();
        let tx = self.links_tx.clone();

        self.link_task = Some(tokio::spawn(async move {
            let token = match tokens.token().await {
                Ok(token) => token,
                Err(error) => {
                    let _ = tx.send(LinkEvent::OpenFailed { generation, error });
                    return;
                }
            };
            let (mut reader, writer) = match connector.connect(&url).await {
                Ok(halves) => halves,
                Err(error) => {
                    let _ = tx.send(LinkEvent::OpenFailed { generation, error });
                    return;
                }
            };
            if tx
                .send(LinkEvent::Opened {
                    generation,
                    writer,
                    token,
                })
                .is_err()
            {
                return;
            }
            loop {
                let event = match reader.recv().await {
                    Ok(Some(text)) => LinkEvent::Frame { generation, text },
                    Ok(None) => LinkEvent::Lost {
                        generation,
                        error: TransportError::Closed,
                    },
                    Err(error) => LinkEvent::Lost { generation, error },
                };
                let done = matches!(event, LinkEvent::Lost { .. });
                if tx.send(event).is_err() || done {
                    return;
                }
            }
        }));
    }

    async fn link_failed(&mut self, error: TransportError) {
        self.drop_link().await;
        self.set_state(ConnectionState::Error(error.to_string()));

        if !is_retryable(&error) {
            tracing::warn!("not retrying after {error}");
            return;
        }
        if self.retry_count >= self.config.max_retries {
            tracing::warn!(
                retries = self.retry_count,
                "gateway unreachable, giving up until the next explicit connect"
            );
            return;
        }

        self.retry_count += 1;
        let delay = self.config.base_delay * self.retry_count;
        tracing::info!(
            attempt = self.retry_count,
            delay_ms = delay.as_millis() as u64,
            "scheduling reconnect after {error}"
        );
        self.schedule_retry(delay);
    }

    fn schedule_retry(&mut self, delay: Duration) {
        self.cancel_retry_timer();
        let timer = self.shutdown.child_token();
        self.retry_timer = Some(timer.clone());

        let generation = self.generation;
        let tx = self.links_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = timer.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = tx.send(LinkEvent::RetryDue { generation });
                }
            }
        });
    }

    fn cancel_retry_timer(&mut self) {
        if let Some(timer) = self.retry_timer.take() {
            timer.cancel();
        }
    }

    /// Tear down the current link (if any) and invalidate its generation.
    async fn drop_link(&mut self) {
        self.generation += 1;
        self.liveness = None;
        self.liveness_deadline = None;
        if let Some(task) = self.link_task.take() {
            task.abort();
        }
        if let Some(mut writer) = self.writer.take() {
            if tokio::time::timeout(CLOSE_TIMEOUT, writer.close()).await.is_err() {
                tracing::debug!("socket close timed out");
            }
        }
    }

    fn set_state(&mut self, next: ConnectionState) {
        if self.state == next {
            return;
        }
        tracing::info!(from = %self.state, to = %next, "connection state changed");
        self.state = next.clone();
        self.state_tx.send_replace(next.clone());
        self.state_bus.publish(next);
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Authentication problems will not heal by retrying with the same token.
fn is_retryable(error: &TransportError) -> bool {
    !matches!(
        error,
        TransportError::Auth(_) | TransportError::TokenUnavailable
    )
}
