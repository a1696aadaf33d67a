//! Connection handshake
//!
//! `Identify` from the server, schema check, `Identity` from us, then a
//! server heartbeat to complete. Anything else, or nothing within the
//! handshake timeout, fails the attempt and closes the transport abnormally.

use std::time::Duration;

use tokio::time::Instant;

use cl_protocol::{
    decode, encode, schema_matches, ClientCloseCode, ClientMessage, Identity, ServerMessage,
};

use super::{ConnectionState, Shared};
use crate::error::ClientError;
use crate::transport::{Transport, TransportEvent};

/// A transport that completed the handshake
pub(crate) struct Established {
    pub transport: Box<dyn Transport>,
    pub heartbeat_interval: Duration,
}

/// Open a transport and run the handshake on it
///
/// On failure the state is left at `Closed`.
pub(crate) async fn handshake(shared: &Shared) -> Result<Established, ClientError> {
    shared.set_state(ConnectionState::Handshaking);

    // One deadline covers the transport upgrade and the negotiation
    let timeout = shared.config.handshake_timeout;
    let deadline = Instant::now() + timeout;
    let connected = match tokio::time::timeout_at(deadline, shared.connector.connect()).await {
        Ok(connected) => connected.map_err(ClientError::from),
        Err(_) => Err(ClientError::HandshakeTimeout(timeout)),
    };
    let mut transport = match connected {
        Ok(transport) => transport,
        Err(err) => {
            tracing::warn!("Connecting to {} failed: {}", shared.connector.endpoint(), err);
            shared.set_state(ConnectionState::Closed);
            return Err(err);
        }
    };

    let negotiated = tokio::time::timeout_at(deadline, negotiate(shared, transport.as_mut())).await;
    let result = match negotiated {
        Ok(result) => result,
        Err(_) => Err(ClientError::HandshakeTimeout(timeout)),
    };

    match result {
        Ok(heartbeat_interval) => {
            tracing::debug!("Handshake complete, heartbeat interval {:?}", heartbeat_interval);
            Ok(Established {
                transport,
                heartbeat_interval,
            })
        }
        Err(err) => {
            tracing::warn!("Handshake with {} failed: {}", shared.connector.endpoint(), err);
            if !matches!(err, ClientError::Closed(_)) {
                if let Err(e) = transport.close(ClientCloseCode::Abnormal).await {
                    tracing::debug!("Failed to close transport: {}", e);
                }
            }
            shared.set_state(ConnectionState::Closed);
            Err(err)
        }
    }
}

async fn negotiate(
    shared: &Shared,
    transport: &mut dyn Transport,
) -> Result<Duration, ClientError> {
    let identify = match next_message(transport).await? {
        ServerMessage::Identify(identify) => identify,
        other => {
            return Err(ClientError::ProtocolViolation(format!(
                "expected Identify, got {:?}",
                other.op()
            )))
        }
    };
    if identify.heartbeat_timeout == 0 {
        return Err(ClientError::ProtocolViolation(
            "server announced a heartbeat interval of 0 ms".into(),
        ));
    }
    if !schema_matches(&identify.schema, &shared.schema) {
        return Err(ClientError::SchemaMismatch);
    }

    shared.set_state(ConnectionState::Authenticating);
    let config = &shared.config;
    let identity = ClientMessage::Identity(Identity {
        token: config.token.clone(),
        cluster: config.cluster.id,
        clusters: config.cluster.count,
    });
    send_message(transport, &identity).await?;

    shared.set_state(ConnectionState::AwaitingHeartbeatAck);
    match next_message(transport).await? {
        ServerMessage::Heartbeat => Ok(Duration::from_millis(identify.heartbeat_timeout)),
        other => Err(ClientError::ProtocolViolation(format!(
            "expected Heartbeat, got {:?}",
            other.op()
        ))),
    }
}

async fn next_message(transport: &mut dyn Transport) -> Result<ServerMessage, ClientError> {
    match transport.recv().await? {
        TransportEvent::Frame(frame) => decode(&frame).map_err(ClientError::from_inbound),
        TransportEvent::Malformed(reason) => Err(ClientError::Decode(reason)),
        TransportEvent::Closed(code) => Err(ClientError::Closed(code)),
    }
}

/// Encode and send one message
pub(crate) async fn send_message(
    transport: &mut dyn Transport,
    message: &ClientMessage,
) -> Result<(), ClientError> {
    let frame = encode(message).map_err(|e| ClientError::Encode(e.to_string()))?;
    transport.send(frame).await?;
    Ok(())
}
