//! ChatSessionController -- one customer-service chat session end to end.
//!
//! Lifecycle: `Idle --start--> Ready(id) --first page + connect--> Active(id)`,
//! with `Failed(reason)` when the session cannot be created. `retry()`
//! recovers from whatever is currently broken. `close()` (or dropping the
//! controller) cancels outstanding work and disconnects the transport; a
//! closed controller refuses every later operation and never reconnects.
//!
//! Everything a UI needs is published as a [`ChatView`] snapshot on a watch
//! channel; the controller never blocks its state lock on network IO.

use std::collections::HashSet;
use std::sync::Arc;

use parley_types::connection::ConnectionState;
use parley_types::error::ChatError;
use parley_types::message::{ChatMessage, ContentKind, MessageDirection};
use parley_types::page::LoadMoreState;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::pager::{HistoryPager, MergeMode, PageApply, PageRequest};
use super::repository::SessionRepository;
use super::timeline::MessageTimeline;
use crate::transport::ChatTransport;

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Idle,
    /// Session created; history and connection are being set up.
    Ready(i64),
    Active(i64),
    Failed(String),
}

impl SessionPhase {
    pub fn session_id(&self) -> Option<i64> {
        match self {
            SessionPhase::Ready(id) | SessionPhase::Active(id) => Some(*id),
            SessionPhase::Idle | SessionPhase::Failed(_) => None,
        }
    }

    fn active_session(&self) -> Option<i64> {
        match self {
            SessionPhase::Active(id) => Some(*id),
            _ => None,
        }
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionPhase::Idle => write!(f, "idle"),
            SessionPhase::Ready(id) => write!(f, "ready (session {id})"),
            SessionPhase::Active(id) => write!(f, "active (session {id})"),
            SessionPhase::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Observable snapshot of a chat session.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChatView {
    pub phase: SessionPhase,
    pub connection: ConnectionState,
    pub load_more: LoadMoreState,
    /// Newest-first.
    pub messages: Vec<ChatMessage>,
}

struct SessionState {
    phase: SessionPhase,
    creating: bool,
    connection: ConnectionState,
    timeline: MessageTimeline,
    pager: HistoryPager,
}

impl SessionState {
    fn snapshot(&self) -> ChatView {
        ChatView {
            phase: self.phase.clone(),
            connection: self.connection.clone(),
            load_more: self.pager.state(),
            messages: self.timeline.messages().to_vec(),
        }
    }
}

/// Shared between the controller and its pump task.
struct Shared {
    state: Mutex<SessionState>,
    view: watch::Sender<ChatView>,
}

impl Shared {
    fn publish(&self, state: &SessionState) {
        self.view.send_replace(state.snapshot());
    }
}

pub struct ChatSessionController<R: SessionRepository> {
    repository: Arc<R>,
    transport: ChatTransport,
    token: SecretString,
    shared: Arc<Shared>,
    cancel: CancellationToken,
    pump: JoinHandle<()>,
}

impl<R: SessionRepository> ChatSessionController<R> {
    /// Wire a controller to its repository and transport.
    ///
    /// Subscribes to the transport immediately so no live message or state
    /// change is missed; nothing is created or connected until
    /// [`start`](Self::start).
    pub fn new(
        repository: Arc<R>,
        transport: ChatTransport,
        token: SecretString,
        page_size: u32,
    ) -> Self {
        let state = SessionState {
            phase: SessionPhase::Idle,
            creating: false,
            connection: transport.state(),
            timeline: MessageTimeline::new(),
            pager: HistoryPager::new(page_size),
        };
        let (view, _) = watch::channel(state.snapshot());
        let shared = Arc::new(Shared {
            state: Mutex::new(state),
            view,
        });
        let cancel = CancellationToken::new();

        let pump = tokio::spawn(pump_transport(
            transport.subscribe_messages(),
            transport.subscribe_state(),
            shared.clone(),
            cancel.clone(),
        ));

        Self {
            repository,
            transport,
            token,
            shared,
            cancel,
            pump,
        }
    }

    /// Create the session, load its first page and connect.
    ///
    /// Returns the id of the existing session if one is already set up.
    pub async fn start(&self) -> Result<i64, ChatError> {
        if self.cancel.is_cancelled() {
            return Err(ChatError::Cancelled);
        }
        {
            let mut state = self.shared.state.lock().await;
            if let Some(id) = state.phase.session_id() {
                return Ok(id);
            }
            if state.creating {
                return Err(ChatError::SessionCreation(
                    "session creation already in progress".to_string(),
                ));
            }
            state.creating = true;
        }

        let created = tokio::select! {
            _ = self.cancel.cancelled() => None,
            result = self.repository.create_session() => Some(result),
        };

        let session_id = {
            let mut state = self.shared.state.lock().await;
            state.creating = false;
            match created {
                None => return Err(ChatError::Cancelled),
                Some(Err(err)) => {
                    tracing::warn!("session creation failed: {err}");
                    state.phase = SessionPhase::Failed(err.to_string());
                    self.shared.publish(&state);
                    return Err(ChatError::SessionCreation(err.to_string()));
                }
                Some(Ok(info)) => {
                    tracing::info!(session_id = info.session_id, "chat session created");
                    state.phase = SessionPhase::Ready(info.session_id);
                    state.timeline = MessageTimeline::new();
                    let page_size = state.pager.page_size();
                    state.pager = HistoryPager::new(page_size);
                    self.shared.publish(&state);
                    info.session_id
                }
            }
        };

        self.activate(session_id).await
    }

    async fn activate(&self, session_id: i64) -> Result<i64, ChatError> {
        let request = {
            let mut state = self.shared.state.lock().await;
            let request = state.pager.begin_first_page();
            self.shared.publish(&state);
            request
        };
        // A failed first page is not fatal: the pager lands in Error and
        // `retry` reissues it.
        self.run_page_request(session_id, request).await;
        self.connect_transport()?;

        let mut state = self.shared.state.lock().await;
        if state.phase == SessionPhase::Ready(session_id) {
            state.phase = SessionPhase::Active(session_id);
            self.shared.publish(&state);
        }
        Ok(session_id)
    }

    /// Send a text message into the active session.
    ///
    /// Returns `false` if there is no active session or the transport is not
    /// connected (the transport then schedules a reconnect). The message is
    /// not echoed locally; it shows up when the gateway delivers it back.
    pub async fn send_message(&self, text: &str) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        let Some(session_id) = self.active_session().await else {
            tracing::debug!("send refused: no active session");
            return false;
        };
        if text.trim().is_empty() {
            return false;
        }
        let sent = self.transport.send(session_id, text, ContentKind::Text).await;
        if !sent && self.cancel.is_cancelled() {
            // closed while the refused send was requesting a reconnect
            self.transport.disconnect();
        }
        sent
    }

    /// Load the next older history page.
    ///
    /// Returns the resulting pager state; a request refused while `Loading`
    /// or `NoMore` returns the current state unchanged.
    pub async fn load_more(&self) -> LoadMoreState {
        let (session_id, request) = {
            let mut state = self.shared.state.lock().await;
            if self.cancel.is_cancelled() {
                return state.pager.state();
            }
            let Some(session_id) = state.phase.active_session() else {
                return state.pager.state();
            };
            let Some(request) = state.pager.begin_load_more() else {
                return state.pager.state();
            };
            self.shared.publish(&state);
            (session_id, request)
        };
        self.run_page_request(session_id, request).await
    }

    /// Reload page 1, replacing the timeline.
    pub async fn refresh(&self) -> Result<LoadMoreState, ChatError> {
        let (session_id, request) = {
            let mut state = self.shared.state.lock().await;
            if self.cancel.is_cancelled() {
                return Err(ChatError::Cancelled);
            }
            let session_id = state.phase.active_session().ok_or(ChatError::NotActive)?;
            let request = state.pager.begin_first_page();
            self.shared.publish(&state);
            (session_id, request)
        };
        Ok(self.run_page_request(session_id, request).await)
    }

    /// Recover from the current failure.
    ///
    /// - no session (idle or failed): create it again,
    /// - active with a dropped or failed connection: reconnect,
    /// - active with a failed page load: reissue that load.
    pub async fn retry(&self) -> Result<(), ChatError> {
        if self.cancel.is_cancelled() {
            return Err(ChatError::Cancelled);
        }
        let (phase, connection, load_more) = {
            let state = self.shared.state.lock().await;
            (state.phase.clone(), state.connection.clone(), state.pager.state())
        };

        match phase {
            SessionPhase::Idle | SessionPhase::Failed(_) => self.start().await.map(|_| ()),
            SessionPhase::Ready(_) => Ok(()),
            SessionPhase::Active(session_id) => {
                if connection.can_connect() {
                    tracing::info!(session_id, %connection, "retrying connection");
                    self.connect_transport()?;
                }
                if load_more == LoadMoreState::Error {
                    self.load_more().await;
                }
                Ok(())
            }
        }
    }

    /// Mark every unread inbound message as read.
    ///
    /// The timeline is updated at once; the server is told in the background
    /// and a failure there is only logged. Returns how many messages changed.
    pub async fn mark_all_unread_as_read(&self) -> usize {
        let ids = {
            let mut state = self.shared.state.lock().await;
            if self.cancel.is_cancelled() || state.phase.active_session().is_none() {
                return 0;
            }
            let ids: Vec<i64> = state
                .timeline
                .messages()
                .iter()
                .filter(|m| m.is_unread() && m.direction == MessageDirection::Inbound)
                .map(|m| m.id)
                .collect();
            if ids.is_empty() {
                return 0;
            }
            state.timeline.mark_read(&ids.iter().copied().collect::<HashSet<_>>());
            self.shared.publish(&state);
            ids
        };

        let count = ids.len();
        let repository = self.repository.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                result = repository.mark_read(&ids) => {
                    if let Err(err) = result {
                        tracing::warn!(count = ids.len(), "failed to mark messages read: {err}");
                    }
                }
            }
        });
        count
    }

    pub fn view(&self) -> ChatView {
        self.shared.view.borrow().clone()
    }

    pub fn subscribe_view(&self) -> watch::Receiver<ChatView> {
        self.shared.view.subscribe()
    }

    /// The underlying transport, e.g. to subscribe to gateway notices.
    pub fn transport(&self) -> &ChatTransport {
        &self.transport
    }

    /// Cancel outstanding work and disconnect. Idempotent.
    pub fn close(&self) {
        if !self.cancel.is_cancelled() {
            tracing::debug!("closing chat session");
        }
        self.cancel.cancel();
        self.transport.disconnect();
        // the pump is gone, so report the disconnect here
        self.shared.view.send_if_modified(|view| {
            let changed = view.connection != ConnectionState::Disconnected;
            view.connection = ConnectionState::Disconnected;
            changed
        });
    }

    async fn active_session(&self) -> Option<i64> {
        self.shared.state.lock().await.phase.active_session()
    }

    /// Connect unless closed. `close()` cancels before it disconnects, so
    /// a connect that raced past the first check is undone by the second.
    fn connect_transport(&self) -> Result<(), ChatError> {
        if self.cancel.is_cancelled() {
            return Err(ChatError::Cancelled);
        }
        self.transport.connect(self.token());
        if self.cancel.is_cancelled() {
            self.transport.disconnect();
            return Err(ChatError::Cancelled);
        }
        Ok(())
    }

    fn token(&self) -> SecretString {
        SecretString::from(self.token.expose_secret().to_owned())
    }

    /// Fetch `request` without holding the lock, then apply the result.
    async fn run_page_request(&self, session_id: i64, request: PageRequest) -> LoadMoreState {
        let result = tokio::select! {
            _ = self.cancel.cancelled() => None,
            result = self.repository.get_message_page(session_id, request.page, request.size) => Some(result),
        };

        let mut state = self.shared.state.lock().await;
        let Some(result) = result else {
            return state.pager.state();
        };
        if self.cancel.is_cancelled() {
            return state.pager.state();
        }

        match state.pager.finish(request, result) {
            PageApply::Merge {
                page,
                mode: MergeMode::Replace,
            } => state.timeline.replace_with_first_page(page),
            PageApply::Merge {
                page,
                mode: MergeMode::Append,
            } => {
                let added = state.timeline.append_older_page(page);
                tracing::debug!(session_id, added, "older history merged");
            }
            PageApply::Failed(_) | PageApply::Stale => {}
        }
        self.shared.publish(&state);
        state.pager.state()
    }
}

impl<R: SessionRepository> Drop for ChatSessionController<R> {
    fn drop(&mut self) {
        self.close();
        self.pump.abort();
    }
}

/// Feed live messages and connection changes into the session state.
async fn pump_transport(
    mut messages: tokio::sync::broadcast::Receiver<ChatMessage>,
    mut states: tokio::sync::broadcast::Receiver<ConnectionState>,
    shared: Arc<Shared>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            received = messages.recv() => match received {
                Ok(message) => {
                    let mut state = shared.state.lock().await;
                    if cancel.is_cancelled() {
                        break;
                    }
                    if state.phase.session_id() != Some(message.session_id) {
                        tracing::debug!(
                            message_id = message.id,
                            session_id = message.session_id,
                            "ignoring message for another session"
                        );
                    } else if state.timeline.prepend_live(message) {
                        shared.publish(&state);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "live message stream lagged");
                }
                Err(RecvError::Closed) => break,
            },
            received = states.recv() => match received {
                Ok(connection) => {
                    let mut state = shared.state.lock().await;
                    if cancel.is_cancelled() {
                        break;
                    }
                    state.connection = connection;
                    shared.publish(&state);
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "connection state stream lagged");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::SupervisorConfig;
    use crate::test_support::{MemoryConnector, MemoryRepository, MemoryServer, message, messages};
    use parley_types::message::ReadStatus;
    use parley_types::page::Page;
    use std::time::Duration;

    fn supervisor_config() -> SupervisorConfig {
        SupervisorConfig {
            url: "wss://gateway.test/ws".to_string(),
            namespace: "cs".to_string(),
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            event_capacity: 64,
        }
    }

    fn controller(
        repo: &MemoryRepository,
        page_size: u32,
    ) -> (ChatSessionController<MemoryRepository>, MemoryServer) {
        let (connector, server) = MemoryConnector::new();
        let transport = ChatTransport::new(connector, supervisor_config());
        let controller = ChatSessionController::new(
            Arc::new(repo.clone()),
            transport,
            SecretString::from("tok"),
            page_size,
        );
        (controller, server)
    }

    async fn wait_view(
        rx: &mut watch::Receiver<ChatView>,
        pred: impl Fn(&ChatView) -> bool,
    ) -> ChatView {
        tokio::time::timeout(Duration::from_secs(30), rx.wait_for(|v| pred(v)))
            .await
            .expect("view never matched")
            .expect("view channel closed")
            .clone()
    }

    fn ids(view: &ChatView) -> Vec<i64> {
        view.messages.iter().map(|m| m.id).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn start_loads_history_and_connects() {
        let repo = MemoryRepository::with_history(7, 25);
        let (controller, mut server) = controller(&repo, 10);
        let mut view = controller.subscribe_view();

        assert_eq!(controller.start().await, Ok(7));
        let current = controller.view();
        assert_eq!(current.phase, SessionPhase::Active(7));
        assert_eq!(current.load_more, LoadMoreState::Success);
        assert_eq!(ids(&current), (16..=25).rev().collect::<Vec<_>>());

        let mut link = server.next_link().await;
        assert_eq!(
            link.next_sent().await.as_deref(),
            Some(r#"40/cs,{"isAdmin":false,"token":"tok"}"#)
        );
        link.push("40/cs");
        wait_view(&mut view, |v| v.connection == ConnectionState::Connected).await;

        // a second start is a no-op
        assert_eq!(controller.start().await, Ok(7));
        assert_eq!(repo.page_requests().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_second_page_yields_thirteen_messages() {
        let repo = MemoryRepository::with_history(7, 0);
        repo.script_page(Page {
            items: messages((11..=20).rev()),
            page_number: 1,
            page_size: 10,
            total: None,
        });
        repo.script_page(Page {
            items: messages([12, 11, 10, 9, 8]),
            page_number: 2,
            page_size: 10,
            total: None,
        });
        let (controller, _server) = controller(&repo, 10);

        controller.start().await.unwrap();
        assert_eq!(controller.load_more().await, LoadMoreState::NoMore);

        let view = controller.view();
        assert_eq!(view.messages.len(), 13);
        assert_eq!(ids(&view), (8..=20).rev().collect::<Vec<_>>());
        for pair in view.messages.windows(2) {
            assert!(pair[0].created_at >= pair[1].created_at);
        }

        // exhausted: further loads are refused without a request
        assert_eq!(controller.load_more().await, LoadMoreState::NoMore);
        assert_eq!(repo.page_requests().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn creation_failure_then_retry() {
        let repo = MemoryRepository::with_history(7, 5);
        repo.fail_create_once("service unavailable");
        let (controller, mut server) = controller(&repo, 10);

        let err = controller.start().await.unwrap_err();
        assert!(matches!(err, ChatError::SessionCreation(_)));
        assert!(matches!(controller.view().phase, SessionPhase::Failed(_)));
        assert_eq!(server.attempts(), 0);
        assert!(!controller.send_message("hello").await);

        controller.retry().await.unwrap();
        assert_eq!(controller.view().phase, SessionPhase::Active(7));
        assert_eq!(controller.view().load_more, LoadMoreState::NoMore);
        server.next_link().await;
    }

    #[tokio::test(start_paused = true)]
    async fn live_messages_prepend_once() {
        let repo = MemoryRepository::with_history(7, 3);
        let (controller, mut server) = controller(&repo, 10);
        let mut view = controller.subscribe_view();
        controller.start().await.unwrap();

        let mut link = server.next_link().await;
        link.next_sent().await;
        link.push("40/cs");
        wait_view(&mut view, |v| v.connection.is_connected()).await;

        let live = r#"42/cs,["msg",{"id":4,"sessionId":7,"type":"agent","content":"hi","createdAt":"2024-05-01T10:00:04Z"}]"#;
        link.push(live);
        link.push(live);
        link.push(r#"42/cs,["msg",{"id":50,"sessionId":99,"type":"agent","content":"x","createdAt":"2024-05-01T10:00:05Z"}]"#);
        link.push(r#"42/cs,["msg",{"id":5,"sessionId":7,"type":"user","content":"me","createdAt":"2024-05-01T10:00:05Z"}]"#);

        let current = wait_view(&mut view, |v| v.messages.first().map(|m| m.id) == Some(5)).await;
        assert_eq!(ids(&current), vec![5, 4, 3, 2, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn send_is_gated_on_connection() {
        let repo = MemoryRepository::with_history(7, 0);
        let (controller, mut server) = controller(&repo, 10);
        let mut view = controller.subscribe_view();
        controller.start().await.unwrap();

        let mut link = server.next_link().await;
        link.next_sent().await;
        assert!(!controller.send_message("too early").await);

        link.push("40/cs");
        wait_view(&mut view, |v| v.connection.is_connected()).await;
        assert!(!controller.send_message("   ").await);
        assert!(controller.send_message("hello").await);
        assert_eq!(
            link.next_sent().await.as_deref(),
            Some(r#"42/cs,["send",{"sessionId":7,"content":{"type":"text","data":"hello"}}]"#)
        );
        // no local echo
        assert!(controller.view().messages.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_page_is_reissued_by_retry() {
        let repo = MemoryRepository::with_history(7, 25);
        repo.fail_page_once(2);
        let (controller, _server) = controller(&repo, 10);
        controller.start().await.unwrap();

        assert_eq!(controller.load_more().await, LoadMoreState::Error);
        assert_eq!(controller.view().messages.len(), 10);

        controller.retry().await.unwrap();
        assert_eq!(controller.view().load_more, LoadMoreState::PullToLoad);
        assert_eq!(controller.view().messages.len(), 20);
        assert_eq!(
            repo.page_requests(),
            vec![(7, 1, 10), (7, 2, 10), (7, 2, 10)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failed_first_page_still_activates() {
        let repo = MemoryRepository::with_history(7, 5);
        repo.fail_page_once(1);
        let (controller, mut server) = controller(&repo, 10);

        controller.start().await.unwrap();
        let view = controller.view();
        assert_eq!(view.phase, SessionPhase::Active(7));
        assert_eq!(view.load_more, LoadMoreState::Error);
        server.next_link().await;

        controller.retry().await.unwrap();
        assert_eq!(ids(&controller.view()), vec![5, 4, 3, 2, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_replaces_timeline() {
        let repo = MemoryRepository::with_history(7, 25);
        let (controller, _server) = controller(&repo, 10);
        assert_eq!(controller.refresh().await, Err(ChatError::NotActive));

        controller.start().await.unwrap();
        controller.load_more().await;
        assert_eq!(controller.view().messages.len(), 20);

        assert_eq!(controller.refresh().await, Ok(LoadMoreState::Success));
        assert_eq!(ids(&controller.view()), (16..=25).rev().collect::<Vec<_>>());
    }

    #[tokio::test(start_paused = true)]
    async fn mark_all_unread_as_read_updates_locally_first() {
        let repo = MemoryRepository::with_history(7, 3);
        repo.fail_mark_read();
        let (controller, _server) = controller(&repo, 10);
        controller.start().await.unwrap();

        assert_eq!(controller.mark_all_unread_as_read().await, 3);
        assert!(
            controller
                .view()
                .messages
                .iter()
                .all(|m| m.status == ReadStatus::Read)
        );

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(repo.marked(), vec![vec![3, 2, 1]]);
        // the server failure is only logged
        assert!(controller.view().messages.iter().all(|m| !m.is_unread()));
        assert_eq!(controller.mark_all_unread_as_read().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_on_retry_after_connection_error() {
        let repo = MemoryRepository::with_history(7, 0);
        let (controller, mut server) = controller(&repo, 10);
        let mut view = controller.subscribe_view();
        controller.start().await.unwrap();

        let mut link = server.next_link().await;
        link.next_sent().await;
        // namespace refusal is terminal for the supervisor
        link.push(r#"44/cs,{"message":"invalid token"}"#);
        wait_view(&mut view, |v| matches!(v.connection, ConnectionState::Error(_))).await;

        controller.retry().await.unwrap();
        let mut link = server.next_link().await;
        assert!(link.next_sent().await.is_some());
        assert_eq!(server.attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn close_before_active_still_disconnects() {
        let repo = MemoryRepository::with_history(7, 5);
        repo.delay_pages(Duration::from_secs(5));
        let (controller, server) = controller(&repo, 10);
        let controller = Arc::new(controller);

        let starter = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.start().await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(controller.view().phase, SessionPhase::Ready(7));

        controller.close();
        assert_eq!(starter.await.unwrap(), Err(ChatError::Cancelled));
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(server.attempts(), 0);
        assert_eq!(controller.view().connection, ConnectionState::Disconnected);
        assert!(controller.view().messages.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn closed_session_never_reconnects() {
        let repo = MemoryRepository::with_history(7, 25);
        let (controller, mut server) = controller(&repo, 10);
        let mut view = controller.subscribe_view();
        controller.start().await.unwrap();

        let mut link = server.next_link().await;
        link.next_sent().await;
        link.push("40/cs");
        wait_view(&mut view, |v| v.connection.is_connected()).await;

        controller.close();
        assert_eq!(controller.view().connection, ConnectionState::Disconnected);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(link.is_closed());
        let before = controller.view();

        assert!(!controller.send_message("after close").await);
        assert_eq!(controller.retry().await, Err(ChatError::Cancelled));
        assert_eq!(controller.refresh().await, Err(ChatError::Cancelled));
        assert_eq!(controller.start().await, Err(ChatError::Cancelled));
        assert_eq!(controller.load_more().await, LoadMoreState::Success);
        assert_eq!(controller.mark_all_unread_as_read().await, 0);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(server.attempts(), 1);
        assert_eq!(repo.page_requests().len(), 1);
        assert_eq!(controller.view(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_controller_closes_socket() {
        let repo = MemoryRepository::with_history(7, 1);
        let (controller, mut server) = controller(&repo, 10);
        let mut view = controller.subscribe_view();
        controller.start().await.unwrap();

        let mut link = server.next_link().await;
        link.next_sent().await;
        link.push("40/cs");
        wait_view(&mut view, |v| v.connection.is_connected()).await;

        drop(controller);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(link.is_closed());
    }

    #[test]
    fn phase_display_and_session_id() {
        assert_eq!(SessionPhase::Active(3).to_string(), "active (session 3)");
        assert_eq!(SessionPhase::Ready(3).session_id(), Some(3));
        assert_eq!(SessionPhase::Failed("x".into()).session_id(), None);
        assert_eq!(message(1).session_id, 7);
    }
}
