//! WebSocket capability used by the chat session.
//!
//! ARCHITECTURE
//! ============
//! A `Connector` performs the handshake and hands back a `Link`: a pair of
//! channels for outgoing commands and incoming events. The session driver
//! only ever sees channels, so tests swap in an in-memory connector while
//! production uses `WsConnector` over `tokio-tungstenite`.
//!
//! Dropping a `Link` (its `outgoing` sender) closes the socket with a normal
//! closure.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use crate::chat::machine::CLOSE_NORMAL;

/// How long the reader waits to flush the reply to a server-initiated close.
const CLOSE_FLUSH: Duration = Duration::from_secs(5);

/// Command for a live socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    Text(String),
    Close { code: u16, reason: String },
}

/// Event from a live socket. `Closed` is always the last event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    Text(String),
    Error(String),
    Closed { code: Option<u16>, reason: String },
}

/// An open socket, expressed as channels.
#[derive(Debug)]
pub struct Link {
    pub outgoing: mpsc::UnboundedSender<Outgoing>,
    pub incoming: mpsc::UnboundedReceiver<Incoming>,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The server refused the upgrade with 401/403.
    #[error("handshake rejected with HTTP {status}")]
    Rejected { status: u16 },
    #[error("websocket connect failed: {0}")]
    Handshake(String),
}

impl TransportError {
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}

#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    /// Perform the handshake against `url` (token already in the query).
    async fn connect(&self, url: &str) -> Result<Link, TransportError>;
}

// =============================================================================
// TUNGSTENITE CONNECTOR
// =============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait::async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Link, TransportError> {
        let (ws, _response) = connect_async(url).await.map_err(handshake_error)?;
        let (mut write, mut read) = ws.split();

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Outgoing>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<Incoming>();

        tokio::spawn(async move {
            loop {
                let (code, reason) = match out_rx.recv().await {
                    Some(Outgoing::Text(text)) => {
                        if let Err(e) = write.send(Message::Text(text.into())).await {
                            tracing::debug!(error = %e, "socket write failed");
                            break;
                        }
                        continue;
                    }
                    Some(Outgoing::Close { code, reason }) => (code, reason),
                    None => (CLOSE_NORMAL, String::new()),
                };
                let frame = CloseFrame { code: CloseCode::from(code), reason: reason.into() };
                if let Err(e) = write.send(Message::Close(Some(frame))).await {
                    tracing::debug!(error = %e, "socket close frame not sent");
                }
                break;
            }
        });

        tokio::spawn(async move {
            while let Some(msg) = read.next().await {
                match msg {
                    Ok(Message::Text(text)) => deliver(&in_tx, Incoming::Text(text.as_str().to_owned())),
                    Ok(Message::Close(frame)) => {
                        let (code, reason) =
                            frame.map_or((None, String::new()), |f| (Some(u16::from(f.code)), f.reason.as_str().to_owned()));
                        deliver(&in_tx, Incoming::Closed { code, reason });
                        // The close reply is queued, not sent; reading again flushes it.
                        if tokio::time::timeout(CLOSE_FLUSH, read.next()).await.is_err() {
                            tracing::debug!("peer kept the socket open after close");
                        }
                        return;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        let detail = e.to_string();
                        deliver(&in_tx, Incoming::Error(detail.clone()));
                        deliver(&in_tx, Incoming::Closed { code: None, reason: detail });
                        return;
                    }
                }
            }
            deliver(&in_tx, Incoming::Closed { code: None, reason: "stream ended".to_owned() });
        });

        Ok(Link { outgoing: out_tx, incoming: in_rx })
    }
}

fn deliver(events: &mpsc::UnboundedSender<Incoming>, event: Incoming) {
    if events.send(event).is_err() {
        tracing::debug!("socket event dropped: link released");
    }
}

fn handshake_error(err: tokio_tungstenite::tungstenite::Error) -> TransportError {
    use tokio_tungstenite::tungstenite::Error;

    match err {
        Error::Http(response) if matches!(response.status().as_u16(), 401 | 403) => {
            TransportError::Rejected { status: response.status().as_u16() }
        }
        other => TransportError::Handshake(other.to_string()),
    }
}

#[cfg(test)]
#[path = "socket_test.rs"]
mod tests;
