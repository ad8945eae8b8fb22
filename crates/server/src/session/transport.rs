//! Connection-level transport seam used by [`ConnectionSession`](super::connection_session::ConnectionSession).

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use thiserror::Error;

/// One inbound message from the peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Inbound {
    /// JSON envelope with a base64 frame.
    Text(String),
    /// Raw encoded image bytes.
    Binary(Vec<u8>),
}

/// Connection-level read/write failure. Always fatal to the session.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    Socket(#[from] axum::Error),
    #[error("connection closed")]
    Closed,
}

/// A persistent, ordered, bidirectional message channel to one peer.
#[async_trait]
pub trait FrameTransport: Send {
    /// Next frame-bearing message. `None` once the peer has closed.
    async fn recv_frame(&mut self) -> Option<Result<Inbound, TransportError>>;

    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Best-effort close handshake.
    async fn close(&mut self);
}

#[async_trait]
impl FrameTransport for WebSocket {
    async fn recv_frame(&mut self) -> Option<Result<Inbound, TransportError>> {
        loop {
            let message = match self.recv().await? {
                Ok(message) => message,
                Err(e) => return Some(Err(e.into())),
            };
            match message {
                Message::Text(text) => return Some(Ok(Inbound::Text(text.as_str().to_owned()))),
                Message::Binary(bytes) => return Some(Ok(Inbound::Binary(bytes.to_vec()))),
                Message::Close(_) => return None,
                // axum answers pings itself
                Message::Ping(_) | Message::Pong(_) => continue,
            }
        }
    }

    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.send(Message::Text(text.into())).await?;
        Ok(())
    }

    async fn close(&mut self) {
        if let Err(e) = self.send(Message::Close(None)).await {
            log::debug!("Close handshake skipped: {e}");
        }
    }
}
