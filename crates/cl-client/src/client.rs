//! Cluster member client handle

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch, Mutex};

use cl_core::{ClientConfig, ConfigError};
use cl_protocol::{CccTarget, CloseReason};

use crate::correlation::CccResponse;
use crate::error::ClientError;
use crate::events::{EventKind, ListenerId, Subscription};
use crate::session::{self, Command, ConnectionState, Shared};
use crate::transport::{connector_for, Connector};

/// Channel capacity for commands from client handles to the session task.
///
/// Every command gets an immediate response from the task (it only queues a
/// frame), so the buffer only absorbs bursts from many concurrent callers.
const COMMAND_CHANNEL_CAPACITY: usize = 64;

/// Handle to one cluster member session
///
/// Cheap to clone; clones share the session.
#[derive(Clone)]
pub struct ClusterClient {
    shared: Arc<Shared>,
    /// Serializes `send_data`: acks carry no id
    send_turn: Arc<Mutex<()>>,
}

impl ClusterClient {
    /// Create a client connecting with the configured transport
    pub fn new(config: ClientConfig, schema: Value) -> Result<Self, ConfigError> {
        config.validate()?;
        let connector = connector_for(&config);
        Ok(Self::with_connector(config, schema, connector))
    }

    /// Create a client with a custom connector
    pub fn with_connector(
        config: ClientConfig,
        schema: Value,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared::new(config, schema, connector)),
            send_turn: Arc::new(Mutex::new(())),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Watch connection state changes
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Subscribe to every event except queries
    pub fn subscribe(&self) -> Subscription {
        self.subscribe_to(EventKind::NOTIFICATIONS)
    }

    /// Subscribe to the given event kinds
    ///
    /// Subscribing to [`EventKind::CccQuery`] turns off the automatic
    /// `"Unhandled"` answer for as long as the subscription lives.
    pub fn subscribe_to(&self, kinds: &[EventKind]) -> Subscription {
        self.shared.events().subscribe(kinds)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.shared.events().unsubscribe(id)
    }

    /// Connect and complete the handshake
    ///
    /// Resolves once the server acknowledged our identity. Failures here are
    /// returned directly and never trigger reconnection.
    pub async fn connect(&self) -> Result<(), ClientError> {
        if !self.shared.try_begin() {
            return Err(ClientError::AlreadyConnected);
        }

        let config = &self.shared.config;
        tracing::info!(
            "Connecting to {} as cluster {}/{}",
            self.shared.connector.endpoint(),
            config.cluster.id,
            config.cluster.count
        );
        let mut attempt = ConnectAttempt {
            shared: &self.shared,
            armed: true,
        };
        let established = session::handshake(&self.shared).await?;
        attempt.armed = false;

        let (link, commands) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        self.shared.attach(link.clone());
        self.shared.mark_established();
        tokio::spawn(session::run(Arc::clone(&self.shared), established, link, commands));

        tracing::info!("Connected to {}", self.shared.connector.endpoint());
        Ok(())
    }

    /// Close the session
    ///
    /// Also cancels a reconnect waiting out its backoff. Resolves once the
    /// session task has finished.
    pub async fn disconnect(&self, reason: CloseReason) -> Result<(), ClientError> {
        let link = self.shared.link().ok_or(ClientError::NotConnected)?;
        let (done, finished) = oneshot::channel();
        link.send(Command::Disconnect { reason, done })
            .await
            .map_err(|_| ClientError::NotConnected)?;
        let _ = finished.await;
        Ok(())
    }

    /// Push typed data and wait for the server's verdict
    pub async fn send_data(&self, kind: u8, data: Value) -> Result<bool, ClientError> {
        let _turn = self.send_turn.lock().await;
        let (responder, reply) = oneshot::channel();
        self.submit(Command::SendData {
            kind,
            data,
            responder,
        })
        .await?;
        reply.await.unwrap_or(Err(ClientError::ConnectionClosed))
    }

    /// Ask one member, or all of them, and wait for the answer
    pub async fn start_ccc(
        &self,
        target: CccTarget,
        data: impl Into<String>,
    ) -> Result<CccResponse, ClientError> {
        let (responder, reply) = oneshot::channel();
        self.submit(Command::StartCcc {
            target,
            data: data.into(),
            responder,
        })
        .await?;
        reply.await.unwrap_or(Err(ClientError::ConnectionClosed))
    }

    async fn submit(&self, command: Command) -> Result<(), ClientError> {
        if !self.state().is_established() {
            return Err(ClientError::NotConnected);
        }
        let link = self.shared.link().ok_or(ClientError::NotConnected)?;
        link.send(command)
            .await
            .map_err(|_| ClientError::NotConnected)
    }
}

/// Returns the session to `Closed` if `connect` is dropped mid-handshake
struct ConnectAttempt<'a> {
    shared: &'a Shared,
    armed: bool,
}

impl Drop for ConnectAttempt<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.shared.set_state(ConnectionState::Closed);
        }
    }
}
