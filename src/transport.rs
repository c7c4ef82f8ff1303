//! Transport socket port and its tokio-tungstenite implementation.
//!
//! The session never talks to a websocket library directly; it drives a
//! [`Socket`] obtained from a [`Transport`], which keeps the lifecycle
//! logic testable against scripted fakes.

#[cfg(test)]
#[path = "transport_test.rs"]
mod transport_test;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

/// Close code used for an intentional, clean shutdown.
pub const CLEAN_CLOSE: u16 = 1000;

/// Code reported when the peer vanished without a close handshake.
const ABNORMAL_CLOSE: u16 = 1006;

/// Socket-level failure: open, send, or abnormal close.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),
    #[error("websocket open failed: {0}")]
    Open(String),
    #[error("websocket send failed: {0}")]
    Send(String),
}

/// Raw status of the underlying socket, polled by the session to
/// re-derive the published connection state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SocketStatus {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Something the socket produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SocketEvent {
    /// A text frame.
    Message(String),
    /// The socket closed.
    Closed { code: u16, was_clean: bool },
}

/// Factory for duplex message sockets, one per session attempt.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a socket to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Open`] when the connection cannot be
    /// established.
    async fn open(&self, url: &str) -> Result<Box<dyn Socket>, TransportError>;
}

/// One open duplex, message-oriented socket.
#[async_trait]
pub trait Socket: Send {
    /// Raw socket status.
    fn status(&self) -> SocketStatus;

    /// Send one text frame.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Send`] when the frame could not be
    /// written; the session treats this as non-fatal.
    async fn send(&mut self, payload: String) -> Result<(), TransportError>;

    /// Next inbound event. `None` once the stream is exhausted.
    async fn next_event(&mut self) -> Option<SocketEvent>;

    /// Close with the given code. Infallible from the caller's view; a
    /// failed close handshake still ends the socket.
    async fn close(&mut self, code: u16);
}

/// Derive the websocket endpoint from an http(s) base URL.
///
/// # Errors
///
/// Returns [`TransportError::InvalidBaseUrl`] for anything that is not
/// an `http://` or `https://` URL.
pub fn derive_ws_url(base_url: &str) -> Result<String, TransportError> {
    if let Some(rest) = base_url.strip_prefix("http://") {
        return Ok(format!("ws://{}/ws", rest.trim_end_matches('/')));
    }
    if let Some(rest) = base_url.strip_prefix("https://") {
        return Ok(format!("wss://{}/ws", rest.trim_end_matches('/')));
    }
    Err(TransportError::InvalidBaseUrl(base_url.to_owned()))
}

/// `tokio-tungstenite` transport.
#[derive(Clone, Copy, Debug, Default)]
pub struct WsTransport;

#[async_trait]
impl Transport for WsTransport {
    async fn open(&self, url: &str) -> Result<Box<dyn Socket>, TransportError> {
        let (stream, _response) = connect_async(url)
            .await
            .map_err(|error| TransportError::Open(error.to_string()))?;
        Ok(Box::new(WsSocket {
            stream,
            status: SocketStatus::Open,
        }))
    }
}

struct WsSocket {
    stream: WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    status: SocketStatus,
}

#[async_trait]
impl Socket for WsSocket {
    fn status(&self) -> SocketStatus {
        self.status
    }

    async fn send(&mut self, payload: String) -> Result<(), TransportError> {
        self.stream
            .send(WsMessage::Text(payload.into()))
            .await
            .map_err(|error| {
                self.status = SocketStatus::Closed;
                TransportError::Send(error.to_string())
            })
    }

    async fn next_event(&mut self) -> Option<SocketEvent> {
        loop {
            match self.stream.next().await {
                Some(Ok(WsMessage::Text(text))) => {
                    return Some(SocketEvent::Message(text.as_str().to_owned()));
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    self.status = SocketStatus::Closed;
                    let code = frame.map_or(ABNORMAL_CLOSE, |f| u16::from(f.code));
                    return Some(SocketEvent::Closed {
                        code,
                        was_clean: code == CLEAN_CLOSE,
                    });
                }
                // Binary and control frames are not part of the protocol.
                Some(Ok(_)) => {}
                Some(Err(error)) => {
                    tracing::warn!(error = %error, "websocket receive error");
                    self.status = SocketStatus::Closed;
                    return Some(SocketEvent::Closed {
                        code: ABNORMAL_CLOSE,
                        was_clean: false,
                    });
                }
                None => {
                    self.status = SocketStatus::Closed;
                    return Some(SocketEvent::Closed {
                        code: ABNORMAL_CLOSE,
                        was_clean: false,
                    });
                }
            }
        }
    }

    async fn close(&mut self, code: u16) {
        self.status = SocketStatus::Closing;
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: "session teardown".into(),
        };
        if let Err(error) = self.stream.close(Some(frame)).await {
            tracing::debug!(error = %error, "close handshake failed");
        }
        self.status = SocketStatus::Closed;
    }
}
