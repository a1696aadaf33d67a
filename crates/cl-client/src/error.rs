//! Client error types

use std::time::Duration;

use thiserror::Error;

use cl_protocol::{describe_close_code, ProtocolError};

use crate::transport::TransportError;

/// Errors surfaced by [`ClusterClient`](crate::ClusterClient) operations
///
/// Errors are `Clone` because a single teardown rejects every pending call
/// with the same cause.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    /// `connect` was called while a session is already active
    #[error("Already connected")]
    AlreadyConnected,

    /// The operation needs an established session
    #[error("Not connected")]
    NotConnected,

    /// The server sent a frame that is not a valid message
    #[error("Server responded with malformed frame: {0}")]
    Decode(String),

    /// The server sent a well-formed frame at the wrong time
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// The server's data schema differs from ours
    #[error("Server schema and client schema are mismatched")]
    SchemaMismatch,

    /// The server did not complete the handshake in time
    #[error("Handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    /// No heartbeat from the server within one interval
    #[error("Server heartbeat timed out")]
    PeerTimeout,

    /// The server closed the connection during the handshake
    #[error("Connection closed by server{}", describe_close(.0))]
    Closed(Option<u16>),

    /// The session ended before a reply arrived
    #[error("Connection closed before a reply arrived")]
    ConnectionClosed,

    /// An outgoing message could not be encoded
    #[error("Failed to encode message: {0}")]
    Encode(String),

    /// The underlying transport failed
    #[error("Transport error: {0}")]
    Transport(String),
}

impl ClientError {
    /// Whether a reconnect attempt could succeed after this error
    ///
    /// A schema mismatch will repeat on every attempt against the same server.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ClientError::SchemaMismatch)
    }

    /// Map a decode failure on an inbound frame
    ///
    /// A parseable frame with an op code outside the server namespace is a
    /// protocol violation; anything else is a decode error.
    pub(crate) fn from_inbound(err: ProtocolError) -> Self {
        match err {
            ProtocolError::UnknownOpcode(op) => {
                ClientError::ProtocolViolation(format!("unknown op code {}", op))
            }
            other => ClientError::Decode(other.to_string()),
        }
    }
}

impl From<TransportError> for ClientError {
    fn from(err: TransportError) -> Self {
        ClientError::Transport(err.to_string())
    }
}

fn describe_close(code: &Option<u16>) -> String {
    match code {
        Some(code) => format!(" with code {} ({})", code, describe_close_code(*code)),
        None => String::new(),
    }
}
