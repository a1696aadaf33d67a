//! cl-protocol: Wire protocol for clusterlink
//!
//! This crate defines the JSON envelope exchanged between a cluster member
//! and the coordinating server, the operation codes for both directions,
//! the close codes either side may use, and the structural schema
//! comparison performed during the handshake.

pub mod close;
pub mod codec;
pub mod error;
pub mod message;
pub mod opcode;
pub mod schema;

pub use close::{describe_close_code, ClientCloseCode, CloseReason, ServerCloseCode};
pub use codec::{decode, encode, Envelope, WireMessage};
pub use error::ProtocolError;
pub use message::{
    CccBegin, CccConfirm, CccData, CccPropagate, CccReply, CccResult, CccTarget, ClientMessage,
    ClusterStatus, DataAck, Identify, Identity, SendData, ServerMessage, UNHANDLED_QUERY_REPLY,
};
pub use opcode::{ClientOpCode, ServerOpCode};
pub use schema::schema_matches;
