//! WsConnector -- [`Connector`] over tokio-tungstenite.
//!
//! The socket is split once connected: [`WsReader`] owns the stream half
//! and yields text frames, [`WsWriter`] owns the sink half. Control frames
//! (ping/pong) are answered by tungstenite itself; binary frames are not
//! part of the gateway protocol and are skipped.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parley_core::connection::{Connector, SocketReader, SocketWriter};
use parley_types::error::TransportError;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::tungstenite::{self, client::IntoClientRequest};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Stream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens gateway sockets with `connect_async`.
#[derive(Debug, Clone, Default)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for WsConnector {
    type Reader = WsReader;
    type Writer = WsWriter;

    async fn connect(&self, url: &str) -> Result<(WsReader, WsWriter), TransportError> {
        let request = url
            .into_client_request()
            .map_err(|e| TransportError::Connect(format!("invalid gateway url: {e}")))?;

        let (stream, response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(map_connect_error)?;
        tracing::debug!(status = %response.status(), "gateway socket opened");

        let (sink, stream) = stream.split();
        Ok((WsReader { stream }, WsWriter { sink }))
    }
}

fn map_connect_error(err: tungstenite::Error) -> TransportError {
    match err {
        tungstenite::Error::Http(response) => {
            let status = response.status();
            if status.as_u16() == 401 || status.as_u16() == 403 {
                TransportError::Auth(format!("gateway refused upgrade: HTTP {status}"))
            } else {
                TransportError::Connect(format!("gateway refused upgrade: HTTP {status}"))
            }
        }
        other => TransportError::Connect(other.to_string()),
    }
}

pub struct WsReader {
    stream: SplitStream<Stream>,
}

impl SocketReader for WsReader {
    async fn recv(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(text.as_str().to_owned())),
                Some(Ok(Message::Close(frame))) => {
                    if let Some(frame) = frame {
                        tracing::debug!(code = %frame.code, reason = %frame.reason, "gateway sent close");
                    }
                    return Ok(None);
                }
                Some(Ok(Message::Binary(data))) => {
                    tracing::debug!(len = data.len(), "skipping binary frame");
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                Some(Err(tungstenite::Error::ConnectionClosed)) | None => return Ok(None),
                Some(Err(e)) => return Err(TransportError::Io(e.to_string())),
            }
        }
    }
}

pub struct WsWriter {
    sink: SplitSink<Stream, Message>,
}

impl SocketWriter for WsWriter {
    async fn send(&mut self, text: &str) -> Result<(), TransportError> {
        self.sink
            .send(Message::text(text))
            .await
            .map_err(|e| match e {
                tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                    TransportError::Closed
                }
                other => TransportError::Io(other.to_string()),
            })
    }

    async fn close(&mut self) {
        if let Err(e) = self.sink.close().await {
            tracing::debug!("error closing gateway socket: {e}");
        }
    }
}
