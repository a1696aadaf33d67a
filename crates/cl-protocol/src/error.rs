//! Protocol error types

use thiserror::Error;

/// Errors that can occur while encoding or decoding frames
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Frame is not a valid JSON envelope
    #[error("Malformed frame: {0}")]
    Malformed(#[source] serde_json::Error),

    /// Operation code not defined for this direction
    #[error("Unknown op code: {0}")]
    UnknownOpcode(u64),

    /// Operation code requires a payload but `d` was absent
    #[error("Missing payload for op code {op}")]
    MissingPayload { op: u8 },

    /// Payload does not match the structure for its operation code
    #[error("Invalid payload for op code {op}: {source}")]
    InvalidPayload {
        op: u8,
        #[source]
        source: serde_json::Error,
    },

    /// Outgoing message could not be serialized
    #[error("Serialization error: {0}")]
    Serialization(#[source] serde_json::Error),
}

impl ProtocolError {
    /// Whether the frame parsed but carried an op code outside the namespace
    pub fn is_unknown_opcode(&self) -> bool {
        matches!(self, ProtocolError::UnknownOpcode(_))
    }
}
