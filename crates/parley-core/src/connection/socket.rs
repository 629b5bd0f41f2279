//! Socket port used by the connection supervisor.
//!
//! A [`Connector`] opens one text-frame socket and hands it back split into
//! a read half and a write half. The supervisor reads on a dedicated task
//! and writes from its actor loop, so the halves must be independently
//! owned. Implementations live in parley-infra (e.g. `WsConnector`).
//!
//! Uses native async fn in traits (RPITIT, Rust 2024 edition).

use std::future::Future;

use parley_types::error::TransportError;

/// Read half of a gateway socket.
pub trait SocketReader: Send + 'static {
    /// Next text frame, `Ok(None)` when the peer closed the socket.
    ///
    /// Non-text frames (binary, ping, pong) are skipped by implementations.
    fn recv(&mut self) -> impl Future<Output = Result<Option<String>, TransportError>> + Send;
}

/// Write half of a gateway socket.
pub trait SocketWriter: Send + 'static {
    fn send(&mut self, text: &str) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Best-effort close; errors are swallowed.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

/// Opens gateway sockets.
pub trait Connector: Send + Sync + 'static {
    type Reader: SocketReader;
    type Writer: SocketWriter;

    fn connect(
        &self,
        url: &str,
    ) -> impl Future<Output = Result<(Self::Reader, Self::Writer), TransportError>> + Send;
}
