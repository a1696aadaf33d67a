//! Session lifecycle
//!
//! One task per connected client owns the transport, the heartbeat timers
//! and the correlation table. Callers talk to it over a bounded command
//! channel; it talks back through oneshot replies, the state watch and the
//! event bus.
//!
//! ```text
//! Idle -> Handshaking -> Authenticating -> AwaitingHeartbeatAck -> Established
//!                                                                      |
//!          Reconnecting <- Closed <- Closing <-------------------------+
//! ```

mod dispatch;
mod handshake;
mod worker;

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};

use cl_core::ClientConfig;
use cl_protocol::{CccTarget, CloseReason};

use crate::correlation::{CccResponse, Responder};
use crate::error::ClientError;
use crate::events::{ClientEvent, EventBus};
use crate::transport::Connector;

pub(crate) use handshake::handshake;
pub(crate) use worker::run;

/// Where a session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Never connected
    Idle,
    /// Transport opening, waiting for `Identify`
    Handshaking,
    /// `Identity` being sent
    Authenticating,
    /// Waiting for the heartbeat that completes the handshake
    AwaitingHeartbeatAck,
    /// Ready for data and queries
    Established,
    /// Tearing down
    Closing,
    /// Torn down; `connect` may be called again
    Closed,
    /// Waiting out the backoff before the next attempt
    Reconnecting,
}

impl ConnectionState {
    pub fn is_established(&self) -> bool {
        matches!(self, ConnectionState::Established)
    }

    /// Whether a session exists or is being set up
    pub fn is_active(&self) -> bool {
        !matches!(self, ConnectionState::Idle | ConnectionState::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Handshaking => "handshaking",
            ConnectionState::Authenticating => "authenticating",
            ConnectionState::AwaitingHeartbeatAck => "awaiting heartbeat ack",
            ConnectionState::Established => "established",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
            ConnectionState::Reconnecting => "reconnecting",
        };
        f.write_str(name)
    }
}

/// Requests from client handles to the session task
pub(crate) enum Command {
    SendData {
        kind: u8,
        data: Value,
        responder: Responder<bool>,
    },
    StartCcc {
        target: CccTarget,
        data: String,
        responder: Responder<CccResponse>,
    },
    ReplyQuery {
        id: String,
        data: String,
        /// Connection the query arrived on
        generation: u64,
    },
    Disconnect {
        reason: CloseReason,
        done: oneshot::Sender<()>,
    },
}

impl Command {
    /// Fail the command without running it
    ///
    /// A rejected disconnect still counts as done: there is nothing left to
    /// close.
    pub fn reject(self, error: ClientError) {
        match self {
            Command::SendData { responder, .. } => {
                let _ = responder.send(Err(error));
            }
            Command::StartCcc { responder, .. } => {
                let _ = responder.send(Err(error));
            }
            Command::ReplyQuery { id, .. } => {
                tracing::debug!("Dropping reply to CCC {}: {}", id, error);
            }
            Command::Disconnect { done, .. } => {
                let _ = done.send(());
            }
        }
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::SendData { kind, .. } => write!(f, "SendData(type {})", kind),
            Command::StartCcc { target, .. } => write!(f, "StartCcc(to {})", target),
            Command::ReplyQuery { id, .. } => write!(f, "ReplyQuery({})", id),
            Command::Disconnect { reason, .. } => write!(f, "Disconnect({:?})", reason),
        }
    }
}

/// State shared between client handles and the session task
pub(crate) struct Shared {
    pub config: ClientConfig,
    pub schema: Value,
    pub connector: Arc<dyn Connector>,
    pub state: watch::Sender<ConnectionState>,
    events: Mutex<EventBus>,
    link: Mutex<Option<mpsc::Sender<Command>>>,
}

impl Shared {
    pub fn new(config: ClientConfig, schema: Value, connector: Arc<dyn Connector>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        Self {
            config,
            schema,
            connector,
            state,
            events: Mutex::new(EventBus::new()),
            link: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::trace!("Session state {} -> {}", previous, state);
        }
    }

    /// Claim the session for a new `connect`, unless one is active
    pub fn try_begin(&self) -> bool {
        self.state.send_if_modified(|state| {
            if state.is_active() {
                false
            } else {
                *state = ConnectionState::Handshaking;
                true
            }
        })
    }

    /// Mark the handshake complete and tell observers
    pub fn mark_established(&self) {
        self.set_state(ConnectionState::Established);
        self.emit(ClientEvent::Connected);
    }

    pub fn emit(&self, event: ClientEvent) -> usize {
        self.events().emit(event)
    }

    pub fn events(&self) -> MutexGuard<'_, EventBus> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Command channel of the running session task, if any
    pub fn link(&self) -> Option<mpsc::Sender<Command>> {
        self.link_slot().clone()
    }

    pub fn attach(&self, commands: mpsc::Sender<Command>) {
        *self.link_slot() = Some(commands);
    }

    /// Forget the command channel, unless a newer session replaced it
    pub fn detach(&self, commands: &mpsc::Sender<Command>) {
        let mut slot = self.link_slot();
        if slot.as_ref().is_some_and(|current| current.same_channel(commands)) {
            *slot = None;
        }
    }

    fn link_slot(&self) -> MutexGuard<'_, Option<mpsc::Sender<Command>>> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
