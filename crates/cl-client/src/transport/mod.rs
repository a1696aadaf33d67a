//! Message transport
//!
//! The session layer only needs whole text frames in both directions plus a
//! close with a numeric code. [`Transport`] is that seam; [`WsTransport`] is
//! the WebSocket implementation used in production.

mod ws;

#[cfg(test)]
pub(crate) mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use cl_core::{ClientConfig, TransportKind};
use cl_protocol::ClientCloseCode;

pub use ws::{WsConnector, WsTransport};

/// Transport-level failures
#[derive(Debug, Error)]
pub enum TransportError {
    /// Could not open the connection
    #[error("Failed to connect to {url}: {message}")]
    Connect { url: String, message: String },

    /// The WebSocket failed after it was opened
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The connection is already gone
    #[error("Connection closed")]
    Closed,
}

/// Something that happened on an open transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A complete text frame
    Frame(String),
    /// A frame arrived that cannot hold wire text
    Malformed(String),
    /// The peer closed the connection, with its close code if it sent one
    Closed(Option<u16>),
}

/// An open, bidirectional frame transport
#[async_trait]
pub trait Transport: Send {
    /// Send one text frame
    async fn send(&mut self, frame: String) -> Result<(), TransportError>;

    /// Wait for the next frame or close
    ///
    /// Must be cancel safe: the session loop races it against timers and
    /// commands.
    async fn recv(&mut self) -> Result<TransportEvent, TransportError>;

    /// Close the connection
    ///
    /// Reserved codes (1005, 1006) are never written to the wire; the
    /// transport closes without a status instead.
    async fn close(&mut self, code: ClientCloseCode) -> Result<(), TransportError>;
}

/// Opens new transports; used for the first connect and every reconnect
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn Transport>, TransportError>;

    /// Where this connector connects to, for logging
    fn endpoint(&self) -> &str;
}

/// Build the connector selected by the configuration
pub fn connector_for(config: &ClientConfig) -> Arc<dyn Connector> {
    match config.transport {
        TransportKind::WebSocket => Arc::new(WsConnector::new(config.url.clone())),
    }
}
