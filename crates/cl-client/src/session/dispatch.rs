//! Message dispatcher
//!
//! Decides what an established session does with each inbound message once
//! the correlation table has had its look.

use cl_protocol::{CccPropagate, ServerMessage};

use crate::error::ClientError;
use crate::events::ClientEvent;

#[derive(Debug)]
pub(crate) enum Dispatch {
    /// Renew the heartbeat timers
    Heartbeat,
    /// Deliver to observers
    Event(ClientEvent),
    /// Deliver to query observers, or answer "Unhandled"
    Query(CccPropagate),
    /// Correlation frame nobody was waiting for
    Ignored,
    /// Tear the session down
    Fatal(ClientError),
}

pub(crate) fn dispatch(message: ServerMessage) -> Dispatch {
    match message {
        ServerMessage::Heartbeat => Dispatch::Heartbeat,
        ServerMessage::ClusterStatus(status) => Dispatch::Event(ClientEvent::ClusterStatus {
            count: status.count,
            connected: status.connected,
        }),
        ServerMessage::DataPushed => Dispatch::Event(ClientEvent::DataPushed),
        ServerMessage::CccPropagate(query) => Dispatch::Query(query),
        ServerMessage::DataAck(_) | ServerMessage::CccConfirm(_) | ServerMessage::CccReturn(_) => {
            Dispatch::Ignored
        }
        ServerMessage::Identify(_) => Dispatch::Fatal(ClientError::ProtocolViolation(
            "Identify received on an established session".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cl_protocol::{ClusterStatus, DataAck, Identify};
    use serde_json::json;

    #[test]
    fn test_notifications_become_events() {
        let status = dispatch(ServerMessage::ClusterStatus(ClusterStatus {
            count: 3,
            connected: vec![0, 2],
        }));
        match status {
            Dispatch::Event(ClientEvent::ClusterStatus { count, connected }) => {
                assert_eq!(count, 3);
                assert_eq!(connected, vec![0, 2]);
            }
            other => panic!("Expected ClusterStatus event, got {:?}", other),
        }
        assert!(matches!(
            dispatch(ServerMessage::DataPushed),
            Dispatch::Event(ClientEvent::DataPushed)
        ));
        assert!(matches!(dispatch(ServerMessage::Heartbeat), Dispatch::Heartbeat));
    }

    #[test]
    fn test_duplicate_identify_is_fatal() {
        let result = dispatch(ServerMessage::Identify(Identify {
            heartbeat_timeout: 1000,
            schema: json!({}),
        }));
        assert!(matches!(
            result,
            Dispatch::Fatal(ClientError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_queries_and_stray_acks() {
        let query = dispatch(ServerMessage::CccPropagate(CccPropagate {
            id: "q".into(),
            data: "hi".into(),
        }));
        assert!(matches!(query, Dispatch::Query(q) if q.id == "q"));
        assert!(matches!(
            dispatch(ServerMessage::DataAck(DataAck { success: true })),
            Dispatch::Ignored
        ));
    }
}
