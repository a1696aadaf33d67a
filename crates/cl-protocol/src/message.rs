//! Message types for the clusterlink protocol
//!
//! Every frame is a JSON envelope `{"op": <int>, "d": <payload>}`. The
//! payload structures below are what travels in `d`; the [`ClientMessage`]
//! and [`ServerMessage`] enums pair each payload with its operation code.
//!
//! # Message Flow
//!
//! 1. Server sends `Identify` with its heartbeat interval and data schema
//! 2. Client checks the schema and answers with `Identity`
//! 3. Server acknowledges with `Heartbeat`; both sides keep exchanging them
//! 4. `SendData` is answered by `DataACK`
//! 5. `CCCBegin` is answered by `CCCConfirm` (carrying an id), then by a
//!    `CCCReturn` with that id once the target members have replied
//! 6. Queries from other members arrive as `CCCPropagate` and are answered
//!    with a client `CCCReturn`

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Reply sent on behalf of a member that has no query handler registered.
pub const UNHANDLED_QUERY_REPLY: &str = "Unhandled";

/// Destination of a cross-cluster query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CccTarget {
    /// A single cluster member
    Peer(u32),
    /// Every connected member; replies are fanned in
    All,
}

impl CccTarget {
    /// Whether this target fans out to every member
    pub fn is_broadcast(&self) -> bool {
        matches!(self, CccTarget::All)
    }
}

impl fmt::Display for CccTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CccTarget::Peer(id) => write!(f, "{}", id),
            CccTarget::All => write!(f, "all"),
        }
    }
}

impl FromStr for CccTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("all") {
            return Ok(CccTarget::All);
        }
        s.parse::<u32>()
            .map(CccTarget::Peer)
            .map_err(|_| format!("expected a cluster id or \"all\", got {:?}", s))
    }
}

impl Serialize for CccTarget {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CccTarget::Peer(id) => serializer.serialize_u32(*id),
            CccTarget::All => serializer.serialize_str("all"),
        }
    }
}

impl<'de> Deserialize<'de> for CccTarget {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Peer(u32),
            Named(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Peer(id) => Ok(CccTarget::Peer(id)),
            Raw::Named(name) if name == "all" => Ok(CccTarget::All),
            Raw::Named(name) => Err(D::Error::custom(format!("unknown CCC target {:?}", name))),
        }
    }
}

/// Result data of a cross-cluster query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CccData {
    /// Reply from a single member
    Single(String),
    /// Replies from several members, in the order they reached the server
    Many(Vec<String>),
}

impl CccData {
    /// Convert to the sequence form, wrapping a single reply
    pub fn into_many(self) -> Vec<String> {
        match self {
            CccData::Single(reply) => vec![reply],
            CccData::Many(replies) => replies,
        }
    }

    /// The reply, if this is the single form
    pub fn as_single(&self) -> Option<&str> {
        match self {
            CccData::Single(reply) => Some(reply),
            CccData::Many(_) => None,
        }
    }
}

/// `Identity` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Authentication token
    pub token: String,
    /// This member's cluster id
    pub cluster: u32,
    /// Total number of clusters
    pub clusters: u32,
}

/// `SendData` payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendData {
    /// Data category
    #[serde(rename = "type")]
    pub kind: u8,
    /// Arbitrary JSON data
    pub data: Value,
}

/// `CCCBegin` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CccBegin {
    /// Who should answer
    pub to: CccTarget,
    /// Query text
    pub data: String,
}

/// Client `CCCReturn` payload, the answer to a propagated query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CccReply {
    /// Id from the `CCCPropagate` frame
    pub id: String,
    /// Answer text
    pub data: String,
}

/// `Identify` payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identify {
    /// Heartbeat interval in milliseconds
    #[serde(rename = "heartbeatTimeout")]
    pub heartbeat_timeout: u64,
    /// The server's data schema descriptor
    pub schema: Value,
}

/// `DataACK` payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataAck {
    /// Whether the server accepted the data
    pub success: bool,
}

/// `CCCPropagate` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CccPropagate {
    /// Correlation id to echo in the reply
    pub id: String,
    /// Query text
    pub data: String,
}

/// Server `CCCReturn` payload, the result of a query this member started
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CccResult {
    /// Correlation id from `CCCConfirm`
    pub id: String,
    /// Who answered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<CccTarget>,
    /// The answer, or answers for a broadcast
    pub data: CccData,
}

/// `CCCConfirm` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CccConfirm {
    /// Server-issued correlation id
    pub id: String,
}

/// `ClusterStatus` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterStatus {
    /// Expected number of clusters
    pub count: u32,
    /// Ids of the clusters currently connected
    pub connected: Vec<u32>,
}

/// Frames sent by a cluster member
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Heartbeat,
    Identity(Identity),
    SendData(SendData),
    CccBegin(CccBegin),
    CccReturn(CccReply),
}

/// Frames sent by the coordinating server
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Heartbeat,
    Identify(Identify),
    DataAck(DataAck),
    CccPropagate(CccPropagate),
    CccReturn(CccResult),
    CccConfirm(CccConfirm),
    ClusterStatus(ClusterStatus),
    DataPushed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ccc_target_wire_form() {
        assert_eq!(serde_json::to_value(CccTarget::Peer(3)).unwrap(), json!(3));
        assert_eq!(serde_json::to_value(CccTarget::All).unwrap(), json!("all"));

        let peer: CccTarget = serde_json::from_value(json!(7)).unwrap();
        assert_eq!(peer, CccTarget::Peer(7));
        let all: CccTarget = serde_json::from_value(json!("all")).unwrap();
        assert_eq!(all, CccTarget::All);
        assert!(serde_json::from_value::<CccTarget>(json!("some")).is_err());
    }

    #[test]
    fn test_ccc_target_from_str() {
        assert_eq!("all".parse::<CccTarget>().unwrap(), CccTarget::All);
        assert_eq!("12".parse::<CccTarget>().unwrap(), CccTarget::Peer(12));
        assert!("-1".parse::<CccTarget>().is_err());
        assert_eq!(CccTarget::Peer(4).to_string(), "4");
    }

    #[test]
    fn test_ccc_data_forms() {
        let single: CccData = serde_json::from_value(json!("pong")).unwrap();
        assert_eq!(single.as_single(), Some("pong"));
        assert_eq!(single.into_many(), vec!["pong".to_string()]);

        let many: CccData = serde_json::from_value(json!(["a", "b"])).unwrap();
        assert_eq!(many, CccData::Many(vec!["a".into(), "b".into()]));
        assert_eq!(many.as_single(), None);
    }

    #[test]
    fn test_identify_field_names() {
        let identify: Identify =
            serde_json::from_value(json!({"heartbeatTimeout": 1000, "schema": {"v": 1}})).unwrap();
        assert_eq!(identify.heartbeat_timeout, 1000);
        assert_eq!(identify.schema, json!({"v": 1}));
    }

    #[test]
    fn test_send_data_type_field() {
        let payload = SendData {
            kind: 2,
            data: json!({"x": 1}),
        };
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({"type": 2, "data": {"x": 1}})
        );
    }
}
