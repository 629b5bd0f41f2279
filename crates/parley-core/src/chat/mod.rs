//! Chat session orchestration.
//!
//! - [`repository`]: the `SessionRepository` port (session creation, history, read receipts).
//! - [`timeline`]: the de-duplicated, newest-first message list.
//! - [`pager`]: the history pagination state machine.
//! - [`controller`]: ties transport, pager and timeline into one session.

pub mod controller;
pub mod pager;
pub mod repository;
pub mod timeline;

pub use controller::{ChatSessionController, ChatView, SessionPhase};
pub use pager::HistoryPager;
pub use repository::SessionRepository;
pub use timeline::MessageTimeline;
