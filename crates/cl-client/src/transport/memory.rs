//! In-memory transport for driving sessions in tests

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use cl_protocol::{decode, encode, ClientCloseCode, ClientMessage, Identify, ServerMessage};

use super::{Connector, Transport, TransportError, TransportEvent};

/// What the client wrote to the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Outbound {
    Frame(String),
    Close(u16),
}

/// Hands the server side of every new connection to the test
pub(crate) struct MemoryConnector {
    peers: mpsc::UnboundedSender<MemoryPeer>,
}

impl MemoryConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MemoryPeer>) {
        let (peers, accepted) = mpsc::unbounded_channel();
        (Self { peers }, accepted)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self) -> Result<Box<dyn Transport>, TransportError> {
        let (to_client, inbound) = mpsc::unbounded_channel();
        let (outbound, from_client) = mpsc::unbounded_channel();
        self.peers
            .send(MemoryPeer {
                to_client,
                from_client,
            })
            .map_err(|_| TransportError::Connect {
                url: self.endpoint().to_string(),
                message: "refused".into(),
            })?;
        Ok(Box::new(MemoryTransport { inbound, outbound }))
    }

    fn endpoint(&self) -> &str {
        "memory://server"
    }
}

struct MemoryTransport {
    inbound: mpsc::UnboundedReceiver<TransportEvent>,
    outbound: mpsc::UnboundedSender<Outbound>,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        self.outbound
            .send(Outbound::Frame(frame))
            .map_err(|_| TransportError::Closed)
    }

    async fn recv(&mut self) -> Result<TransportEvent, TransportError> {
        Ok(self
            .inbound
            .recv()
            .await
            .unwrap_or(TransportEvent::Closed(None)))
    }

    async fn close(&mut self, code: ClientCloseCode) -> Result<(), TransportError> {
        let _ = self.outbound.send(Outbound::Close(code.as_u16()));
        Ok(())
    }
}

/// The server end of one in-memory connection
pub(crate) struct MemoryPeer {
    to_client: mpsc::UnboundedSender<TransportEvent>,
    from_client: mpsc::UnboundedReceiver<Outbound>,
}

impl MemoryPeer {
    pub fn send(&self, message: ServerMessage) {
        self.send_raw(&encode(&message).unwrap());
    }

    pub fn send_raw(&self, frame: &str) {
        let _ = self.to_client.send(TransportEvent::Frame(frame.to_string()));
    }

    /// Deliver a frame the client cannot read as text
    pub fn send_malformed(&self, reason: &str) {
        let _ = self.to_client.send(TransportEvent::Malformed(reason.to_string()));
    }

    pub fn close(&self, code: Option<u16>) {
        let _ = self.to_client.send(TransportEvent::Closed(code));
    }

    /// Next thing the client wrote, or `None` once it dropped the transport
    pub async fn next(&mut self) -> Option<Outbound> {
        self.from_client.recv().await
    }

    pub async fn expect_message(&mut self) -> ClientMessage {
        match self.next().await {
            Some(Outbound::Frame(frame)) => decode(&frame).unwrap(),
            other => panic!("Expected a frame, got {:?}", other),
        }
    }

    pub async fn expect_close(&mut self) -> u16 {
        match self.next().await {
            Some(Outbound::Close(code)) => code,
            other => panic!("Expected a close, got {:?}", other),
        }
    }

    /// Run the server side of a successful handshake
    pub async fn accept(&mut self, heartbeat_ms: u64, schema: Value) -> ClientMessage {
        self.send(ServerMessage::Identify(Identify {
            heartbeat_timeout: heartbeat_ms,
            schema,
        }));
        let identity = self.expect_message().await;
        self.send(ServerMessage::Heartbeat);
        identity
    }
}
