//! SessionRepository trait definition.
//!
//! The request/response side of the chat backend: creating a session,
//! serving history pages and accepting read receipts. Implementations live
//! in parley-infra (e.g. `HttpSessionRepository`).

use parley_types::error::RepositoryError;
use parley_types::message::SessionInfo;
use parley_types::page::Page;

/// Repository trait for chat sessions and their message history.
///
/// Uses native async fn in traits (RPITIT, Rust 2024 edition).
pub trait SessionRepository: Send + Sync + 'static {
    /// Open a new customer-service session.
    fn create_session(
        &self,
    ) -> impl std::future::Future<Output = Result<SessionInfo, RepositoryError>> + Send;

    /// Fetch one page of history, newest-first. `page` is 1-based.
    fn get_message_page(
        &self,
        session_id: i64,
        page: u32,
        size: u32,
    ) -> impl std::future::Future<Output = Result<Page, RepositoryError>> + Send;

    /// Mark the given messages as read on the server.
    fn mark_read(
        &self,
        ids: &[i64],
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}
