//! In-memory doubles for the socket and repository ports.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parley_types::connection::ConnectionState;
use parley_types::error::{RepositoryError, TransportError};
use parley_types::message::{ChatMessage, MessageDirection, ReadStatus, SessionInfo};
use parley_types::page::Page;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;

use crate::chat::repository::SessionRepository;
use crate::connection::socket::{Connector, SocketReader, SocketWriter};

const WAIT: Duration = Duration::from_secs(30);

// ── Socket ──────────────────────────────────────────────────────────────────

enum Inbound {
    Text(String),
    Error(String),
    Close,
}

#[derive(Default)]
struct LinkFlags {
    broken: AtomicBool,
    closed: AtomicBool,
}

#[derive(Default)]
struct ServerShared {
    refuse: Option<String>,
    attempt_times: Vec<Instant>,
}

/// Connector handing out in-memory links; the paired [`MemoryServer`]
/// plays the gateway.
pub(crate) struct MemoryConnector {
    shared: Arc<Mutex<ServerShared>>,
    links: mpsc::UnboundedSender<LinkHandle>,
}

pub(crate) struct MemoryServer {
    shared: Arc<Mutex<ServerShared>>,
    links: mpsc::UnboundedReceiver<LinkHandle>,
}

impl MemoryConnector {
    pub(crate) fn new() -> (Self, MemoryServer) {
        let shared = Arc::new(Mutex::new(ServerShared::default()));
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                shared: shared.clone(),
                links: tx,
            },
            MemoryServer { shared, links: rx },
        )
    }
}

impl MemoryServer {
    /// Fail every subsequent connect with `reason`.
    pub(crate) fn refuse_all(&self, reason: &str) {
        self.shared.lock().unwrap().refuse = Some(reason.to_string());
    }

    pub(crate) fn attempts(&self) -> usize {
        self.shared.lock().unwrap().attempt_times.len()
    }

    pub(crate) fn attempt_times(&self) -> Vec<Instant> {
        self.shared.lock().unwrap().attempt_times.clone()
    }

    pub(crate) async fn next_link(&mut self) -> LinkHandle {
        tokio::time::timeout(WAIT, self.links.recv())
            .await
            .expect("no connection attempt")
            .expect("connector dropped")
    }
}

impl Connector for MemoryConnector {
    type Reader = MemoryReader;
    type Writer = MemoryWriter;

    async fn connect(&self, url: &str) -> Result<(MemoryReader, MemoryWriter), TransportError> {
        {
            let mut shared = self.shared.lock().unwrap();
            shared.attempt_times.push(Instant::now());
            if let Some(reason) = &shared.refuse {
                return Err(TransportError::Connect(reason.clone()));
            }
        }

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let flags = Arc::new(LinkFlags::default());

        let _ = self.links.send(LinkHandle {
            url: url.to_string(),
            inbound: inbound_tx,
            sent: sent_rx,
            flags: flags.clone(),
        });

        Ok((
            MemoryReader { inbound: inbound_rx },
            MemoryWriter {
                sent: sent_tx,
                flags,
            },
        ))
    }
}

pub(crate) struct MemoryReader {
    inbound: mpsc::UnboundedReceiver<Inbound>,
}

impl SocketReader for MemoryReader {
    async fn recv(&mut self) -> Result<Option<String>, TransportError> {
        match self.inbound.recv().await {
            Some(Inbound::Text(text)) => Ok(Some(text)),
            Some(Inbound::Error(reason)) => Err(TransportError::Io(reason)),
            Some(Inbound::Close) | None => Ok(None),
        }
    }
}

pub(crate) struct MemoryWriter {
    sent: mpsc::UnboundedSender<String>,
    flags: Arc<LinkFlags>,
}

impl SocketWriter for MemoryWriter {
    async fn send(&mut self, text: &str) -> Result<(), TransportError> {
        if self.flags.broken.load(Ordering::SeqCst) {
            return Err(TransportError::Io("broken pipe".to_string()));
        }
        if self.flags.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let _ = self.sent.send(text.to_string());
        Ok(())
    }

    async fn close(&mut self) {
        self.flags.closed.store(true, Ordering::SeqCst);
    }
}

/// Gateway side of one accepted link.
pub(crate) struct LinkHandle {
    url: String,
    inbound: mpsc::UnboundedSender<Inbound>,
    sent: mpsc::UnboundedReceiver<String>,
    flags: Arc<LinkFlags>,
}

impl LinkHandle {
    pub(crate) fn url(&self) -> &str {
        &self.url
    }

    /// Deliver a frame to the client.
    pub(crate) fn push(&self, text: &str) {
        let _ = self.inbound.send(Inbound::Text(text.to_string()));
    }

    #[allow(dead_code)]
    pub(crate) fn fail(&self, reason: &str) {
        let _ = self.inbound.send(Inbound::Error(reason.to_string()));
    }

    /// Close from the gateway side.
    pub(crate) fn close(&self) {
        let _ = self.inbound.send(Inbound::Close);
    }

    /// Make every later client write fail.
    pub(crate) fn break_writes(&self) {
        self.flags.broken.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.flags.closed.load(Ordering::SeqCst)
    }

    /// Next frame written by the client.
    pub(crate) async fn next_sent(&mut self) -> Option<String> {
        tokio::time::timeout(WAIT, self.sent.recv()).await.ok().flatten()
    }

    pub(crate) fn try_sent(&mut self) -> Option<String> {
        self.sent.try_recv().ok()
    }
}

pub(crate) async fn next_state(rx: &mut broadcast::Receiver<ConnectionState>) -> ConnectionState {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("no state transition")
        .expect("state channel closed")
}

pub(crate) async fn wait_for_state(
    rx: &mut broadcast::Receiver<ConnectionState>,
    target: ConnectionState,
) {
    loop {
        let state = next_state(rx).await;
        if state == target {
            return;
        }
    }
}

// ── Repository ──────────────────────────────────────────────────────────────

pub(crate) fn base_time() -> DateTime<Utc> {
    "2024-05-01T10:00:00Z".parse().unwrap()
}

/// Inbound, unread message of session 7 whose timestamp grows with `id`.
pub(crate) fn message(id: i64) -> ChatMessage {
    ChatMessage {
        id,
        session_id: 7,
        direction: MessageDirection::Inbound,
        content: format!("message {id}"),
        status: ReadStatus::Unread,
        created_at: base_time() + chrono::Duration::seconds(id),
    }
}

pub(crate) fn messages(ids: impl IntoIterator<Item = i64>) -> Vec<ChatMessage> {
    ids.into_iter().map(message).collect()
}

#[derive(Default)]
struct RepoShared {
    session_id: i64,
    create_failures: VecDeque<String>,
    /// Newest-first.
    history: Vec<ChatMessage>,
    scripted: HashMap<u32, Page>,
    page_failures: HashMap<u32, u32>,
    page_delay: Option<Duration>,
    mark_read_fails: bool,
    page_requests: Vec<(i64, u32, u32)>,
    marked: Vec<Vec<i64>>,
}

/// Scriptable [`SessionRepository`].
#[derive(Clone, Default)]
pub(crate) struct MemoryRepository {
    shared: Arc<Mutex<RepoShared>>,
}

impl MemoryRepository {
    /// Session 7 whose history holds ids `count..=1`, newest first.
    pub(crate) fn with_history(session_id: i64, count: i64) -> Self {
        let repo = Self::default();
        {
            let mut shared = repo.shared.lock().unwrap();
            shared.session_id = session_id;
            shared.history = messages((1..=count).rev());
        }
        repo
    }

    /// Serve `page` verbatim for page number `page.page_number`.
    pub(crate) fn script_page(&self, page: Page) {
        self.shared.lock().unwrap().scripted.insert(page.page_number, page);
    }

    pub(crate) fn fail_create_once(&self, reason: &str) {
        self.shared
            .lock()
            .unwrap()
            .create_failures
            .push_back(reason.to_string());
    }

    pub(crate) fn fail_page_once(&self, page: u32) {
        *self.shared.lock().unwrap().page_failures.entry(page).or_default() += 1;
    }

    pub(crate) fn delay_pages(&self, delay: Duration) {
        self.shared.lock().unwrap().page_delay = Some(delay);
    }

    pub(crate) fn fail_mark_read(&self) {
        self.shared.lock().unwrap().mark_read_fails = true;
    }

    pub(crate) fn page_requests(&self) -> Vec<(i64, u32, u32)> {
        self.shared.lock().unwrap().page_requests.clone()
    }

    pub(crate) fn marked(&self) -> Vec<Vec<i64>> {
        self.shared.lock().unwrap().marked.clone()
    }
}

impl SessionRepository for MemoryRepository {
    async fn create_session(&self) -> Result<SessionInfo, RepositoryError> {
        let mut shared = self.shared.lock().unwrap();
        if let Some(reason) = shared.create_failures.pop_front() {
            return Err(RepositoryError::Http(reason));
        }
        Ok(SessionInfo {
            session_id: shared.session_id,
        })
    }

    async fn get_message_page(
        &self,
        session_id: i64,
        page: u32,
        size: u32,
    ) -> Result<Page, RepositoryError> {
        let delay = {
            let mut shared = self.shared.lock().unwrap();
            shared.page_requests.push((session_id, page, size));
            shared.page_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut shared = self.shared.lock().unwrap();
        if let Some(remaining) = shared.page_failures.get_mut(&page) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(RepositoryError::Http("page fetch failed".to_string()));
            }
        }
        if let Some(scripted) = shared.scripted.get(&page) {
            return Ok(scripted.clone());
        }

        let start = ((page.saturating_sub(1)) * size) as usize;
        let items = shared
            .history
            .iter()
            .skip(start)
            .take(size as usize)
            .cloned()
            .collect();
        Ok(Page {
            items,
            page_number: page,
            page_size: size,
            total: Some(shared.history.len() as u64),
        })
    }

    async fn mark_read(&self, ids: &[i64]) -> Result<(), RepositoryError> {
        let mut shared = self.shared.lock().unwrap();
        shared.marked.push(ids.to_vec());
        if shared.mark_read_fails {
            return Err(RepositoryError::Status {
                status: 500,
                body: "boom".to_string(),
            });
        }
        Ok(())
    }
}
