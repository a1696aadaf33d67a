//! Operation codes
//!
//! The two directions use separate namespaces: op `4` is `CCCReturn` in
//! both, but op `1` is `Identity` when sent by a client and `Identify` when
//! sent by the server.

/// Operation codes sent by a cluster member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ClientOpCode {
    /// Liveness ping
    Heartbeat = 0,
    /// Authentication and cluster placement
    Identity = 1,
    /// Typed data push, acknowledged with `DataACK`
    SendData = 2,
    /// Start a cross-cluster query
    CccBegin = 3,
    /// Answer to a propagated cross-cluster query
    CccReturn = 4,
}

impl ClientOpCode {
    /// Convert to u8
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Heartbeat),
            1 => Some(Self::Identity),
            2 => Some(Self::SendData),
            3 => Some(Self::CccBegin),
            4 => Some(Self::CccReturn),
            _ => None,
        }
    }
}

/// Operation codes sent by the coordinating server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ServerOpCode {
    /// Liveness ping, also the handshake acknowledgment
    Heartbeat = 0,
    /// First frame of the handshake
    Identify = 1,
    /// Acknowledgment of `SendData`
    DataAck = 2,
    /// Query from another cluster member
    CccPropagate = 3,
    /// Result of a query this member started
    CccReturn = 4,
    /// Server-issued id for a query this member started
    CccConfirm = 5,
    /// Cluster membership update
    ClusterStatus = 6,
    /// New data is available
    DataPushed = 7,
}

impl ServerOpCode {
    /// Convert to u8
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Heartbeat),
            1 => Some(Self::Identify),
            2 => Some(Self::DataAck),
            3 => Some(Self::CccPropagate),
            4 => Some(Self::CccReturn),
            5 => Some(Self::CccConfirm),
            6 => Some(Self::ClusterStatus),
            7 => Some(Self::DataPushed),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_opcode_roundtrip() {
        for op in [
            ClientOpCode::Heartbeat,
            ClientOpCode::Identity,
            ClientOpCode::SendData,
            ClientOpCode::CccBegin,
            ClientOpCode::CccReturn,
        ] {
            assert_eq!(ClientOpCode::from_u8(op.as_u8()), Some(op));
        }
        assert_eq!(ClientOpCode::from_u8(5), None);
    }

    #[test]
    fn test_server_opcode_values() {
        assert_eq!(ServerOpCode::Heartbeat.as_u8(), 0);
        assert_eq!(ServerOpCode::Identify.as_u8(), 1);
        assert_eq!(ServerOpCode::CccConfirm.as_u8(), 5);
        assert_eq!(ServerOpCode::DataPushed.as_u8(), 7);
        assert_eq!(ServerOpCode::from_u8(6), Some(ServerOpCode::ClusterStatus));
        assert_eq!(ServerOpCode::from_u8(8), None);
    }
}
