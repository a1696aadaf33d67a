//! JSON envelope codec
//!
//! Frames are self-delimiting (one WebSocket text message each), so the codec
//! works on whole strings rather than on a byte stream.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;
use crate::message::{ClientMessage, ServerMessage};
use crate::opcode::{ClientOpCode, ServerOpCode};

/// The raw `{op, d}` wrapper around every frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Operation code
    pub op: u64,
    /// Payload, absent for heartbeats and notifications
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d: Option<Value>,
}

/// A message that can be carried in an [`Envelope`]
pub trait WireMessage: Sized {
    /// Operation code for this message
    fn opcode(&self) -> u8;

    /// Payload for the `d` field
    fn payload(&self) -> Result<Option<Value>, ProtocolError>;

    /// Rebuild a message from its operation code and payload
    fn from_envelope(op: u8, d: Option<Value>) -> Result<Self, ProtocolError>;
}

/// Encode a message into a JSON frame
pub fn encode<M: WireMessage>(message: &M) -> Result<String, ProtocolError> {
    let envelope = Envelope {
        op: u64::from(message.opcode()),
        d: message.payload()?,
    };
    serde_json::to_string(&envelope).map_err(ProtocolError::Serialization)
}

/// Decode a JSON frame into a message
pub fn decode<M: WireMessage>(text: &str) -> Result<M, ProtocolError> {
    let envelope: Envelope = serde_json::from_str(text).map_err(ProtocolError::Malformed)?;
    let op = u8::try_from(envelope.op).map_err(|_| ProtocolError::UnknownOpcode(envelope.op))?;
    M::from_envelope(op, envelope.d)
}

fn to_payload<T: Serialize>(payload: &T) -> Result<Option<Value>, ProtocolError> {
    serde_json::to_value(payload)
        .map(Some)
        .map_err(ProtocolError::Serialization)
}

fn from_payload<T: DeserializeOwned>(op: u8, d: Option<Value>) -> Result<T, ProtocolError> {
    let value = d.ok_or(ProtocolError::MissingPayload { op })?;
    serde_json::from_value(value).map_err(|source| ProtocolError::InvalidPayload { op, source })
}

impl ClientMessage {
    /// Operation code of this message
    pub fn op(&self) -> ClientOpCode {
        match self {
            ClientMessage::Heartbeat => ClientOpCode::Heartbeat,
            ClientMessage::Identity(_) => ClientOpCode::Identity,
            ClientMessage::SendData(_) => ClientOpCode::SendData,
            ClientMessage::CccBegin(_) => ClientOpCode::CccBegin,
            ClientMessage::CccReturn(_) => ClientOpCode::CccReturn,
        }
    }
}

impl WireMessage for ClientMessage {
    fn opcode(&self) -> u8 {
        self.op().as_u8()
    }

    fn payload(&self) -> Result<Option<Value>, ProtocolError> {
        match self {
            ClientMessage::Heartbeat => Ok(None),
            ClientMessage::Identity(p) => to_payload(p),
            ClientMessage::SendData(p) => to_payload(p),
            ClientMessage::CccBegin(p) => to_payload(p),
            ClientMessage::CccReturn(p) => to_payload(p),
        }
    }

    fn from_envelope(op: u8, d: Option<Value>) -> Result<Self, ProtocolError> {
        let code = ClientOpCode::from_u8(op).ok_or(ProtocolError::UnknownOpcode(u64::from(op)))?;
        Ok(match code {
            ClientOpCode::Heartbeat => ClientMessage::Heartbeat,
            ClientOpCode::Identity => ClientMessage::Identity(from_payload(op, d)?),
            ClientOpCode::SendData => ClientMessage::SendData(from_payload(op, d)?),
            ClientOpCode::CccBegin => ClientMessage::CccBegin(from_payload(op, d)?),
            ClientOpCode::CccReturn => ClientMessage::CccReturn(from_payload(op, d)?),
        })
    }
}

impl ServerMessage {
    /// Operation code of this message
    pub fn op(&self) -> ServerOpCode {
        match self {
            ServerMessage::Heartbeat => ServerOpCode::Heartbeat,
            ServerMessage::Identify(_) => ServerOpCode::Identify,
            ServerMessage::DataAck(_) => ServerOpCode::DataAck,
            ServerMessage::CccPropagate(_) => ServerOpCode::CccPropagate,
            ServerMessage::CccReturn(_) => ServerOpCode::CccReturn,
            ServerMessage::CccConfirm(_) => ServerOpCode::CccConfirm,
            ServerMessage::ClusterStatus(_) => ServerOpCode::ClusterStatus,
            ServerMessage::DataPushed => ServerOpCode::DataPushed,
        }
    }
}

impl WireMessage for ServerMessage {
    fn opcode(&self) -> u8 {
        self.op().as_u8()
    }

    fn payload(&self) -> Result<Option<Value>, ProtocolError> {
        match self {
            ServerMessage::Heartbeat | ServerMessage::DataPushed => Ok(None),
            ServerMessage::Identify(p) => to_payload(p),
            ServerMessage::DataAck(p) => to_payload(p),
            ServerMessage::CccPropagate(p) => to_payload(p),
            ServerMessage::CccReturn(p) => to_payload(p),
            ServerMessage::CccConfirm(p) => to_payload(p),
            ServerMessage::ClusterStatus(p) => to_payload(p),
        }
    }

    fn from_envelope(op: u8, d: Option<Value>) -> Result<Self, ProtocolError> {
        let code = ServerOpCode::from_u8(op).ok_or(ProtocolError::UnknownOpcode(u64::from(op)))?;
        Ok(match code {
            // Payloads on notification frames are ignored
            ServerOpCode::Heartbeat => ServerMessage::Heartbeat,
            ServerOpCode::DataPushed => ServerMessage::DataPushed,
            ServerOpCode::Identify => ServerMessage::Identify(from_payload(op, d)?),
            ServerOpCode::DataAck => ServerMessage::DataAck(from_payload(op, d)?),
            ServerOpCode::CccPropagate => ServerMessage::CccPropagate(from_payload(op, d)?),
            ServerOpCode::CccReturn => ServerMessage::CccReturn(from_payload(op, d)?),
            ServerOpCode::CccConfirm => ServerMessage::CccConfirm(from_payload(op, d)?),
            ServerOpCode::ClusterStatus => ServerMessage::ClusterStatus(from_payload(op, d)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{CccBegin, CccData, CccTarget, DataAck, Identity};
    use serde_json::json;

    #[test]
    fn test_heartbeat_has_no_payload() {
        let frame = encode(&ClientMessage::Heartbeat).unwrap();
        assert_eq!(frame, r#"{"op":0}"#);
    }

    #[test]
    fn test_encode_identity() {
        let frame = encode(&ClientMessage::Identity(Identity {
            token: "secret".into(),
            cluster: 1,
            clusters: 4,
        }))
        .unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(
            value,
            json!({"op": 1, "d": {"token": "secret", "cluster": 1, "clusters": 4}})
        );
    }

    #[test]
    fn test_encode_broadcast_begin() {
        let frame = encode(&ClientMessage::CccBegin(CccBegin {
            to: CccTarget::All,
            data: "ping".into(),
        }))
        .unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value, json!({"op": 3, "d": {"to": "all", "data": "ping"}}));
    }

    #[test]
    fn test_decode_server_frames() {
        let ack: ServerMessage = decode(r#"{"op":2,"d":{"success":true}}"#).unwrap();
        assert_eq!(ack, ServerMessage::DataAck(DataAck { success: true }));

        let pushed: ServerMessage = decode(r#"{"op":7}"#).unwrap();
        assert_eq!(pushed, ServerMessage::DataPushed);

        let beat: ServerMessage = decode(r#"{"op":0,"d":null}"#).unwrap();
        assert_eq!(beat, ServerMessage::Heartbeat);

        let ret: ServerMessage =
            decode(r#"{"op":4,"d":{"id":"a1","from":"all","data":["x","y"]}}"#).unwrap();
        match ret {
            ServerMessage::CccReturn(result) => {
                assert_eq!(result.id, "a1");
                assert_eq!(result.from, Some(CccTarget::All));
                assert_eq!(result.data, CccData::Many(vec!["x".into(), "y".into()]));
            }
            other => panic!("Expected CccReturn, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_malformed() {
        let result = decode::<ServerMessage>("{not json");
        assert!(matches!(result, Err(ProtocolError::Malformed(_))));

        let result = decode::<ServerMessage>(r#"{"d":{}}"#);
        assert!(matches!(result, Err(ProtocolError::Malformed(_))));
    }

    #[test]
    fn test_decode_unknown_opcode() {
        let result = decode::<ServerMessage>(r#"{"op":42}"#);
        assert!(matches!(result, Err(ProtocolError::UnknownOpcode(42))));

        let result = decode::<ServerMessage>(r#"{"op":70000}"#);
        assert!(result.unwrap_err().is_unknown_opcode());
    }

    #[test]
    fn test_decode_missing_or_invalid_payload() {
        let result = decode::<ServerMessage>(r#"{"op":2}"#);
        assert!(matches!(result, Err(ProtocolError::MissingPayload { op: 2 })));

        let result = decode::<ServerMessage>(r#"{"op":5,"d":{"id":7}}"#);
        assert!(matches!(result, Err(ProtocolError::InvalidPayload { op: 5, .. })));
    }

    #[test]
    fn test_client_frames_decode_in_client_namespace() {
        let msg: ClientMessage = decode(r#"{"op":4,"d":{"id":"q","data":"Unhandled"}}"#).unwrap();
        assert_eq!(msg.op(), ClientOpCode::CccReturn);
        assert!(decode::<ClientMessage>(r#"{"op":5}"#).is_err());
    }
}
