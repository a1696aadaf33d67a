//! Session task
//!
//! Runs an established connection until it ends, then either stops or waits
//! out the backoff and handshakes again. Everything that touches the
//! transport, the heartbeat timers or the correlation table happens here.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use cl_protocol::{
    decode, CccBegin, CccPropagate, CccReply, ClientCloseCode, ClientMessage, CloseReason,
    SendData, ServerMessage, UNHANDLED_QUERY_REPLY,
};

use super::dispatch::{dispatch, Dispatch};
use super::handshake::{handshake, send_message, Established};
use super::{Command, ConnectionState, Shared};
use crate::correlation::CorrelationTable;
use crate::error::ClientError;
use crate::events::{CccQuery, ClientEvent, DisconnectCause, EventKind};
use crate::heartbeat::{HeartbeatEvent, HeartbeatMonitor};
use crate::reconnect::ExponentialBackoff;
use crate::transport::{Transport, TransportEvent};

/// Why a connection ended
enum Teardown {
    /// The caller asked to disconnect
    Requested {
        reason: CloseReason,
        done: oneshot::Sender<()>,
    },
    /// No heartbeat within one interval
    PeerTimeout,
    /// The server broke the protocol
    Fatal(ClientError),
    /// The transport closed or failed underneath us
    Dropped(DisconnectCause),
}

/// What the session task does after a connection ended
enum Outcome {
    /// Finish, acknowledging a disconnect request if there was one
    Stop(Option<oneshot::Sender<()>>),
    /// Reconnect if configured to
    Retry,
}

/// Drive a session from its first established connection until it stops
pub(crate) async fn run(
    shared: Arc<Shared>,
    established: Established,
    link: mpsc::Sender<Command>,
    mut commands: mpsc::Receiver<Command>,
) {
    let mut backoff = ExponentialBackoff::from_config(&shared.config.backoff);
    let mut established = established;
    let mut generation = 0;

    // The final `Disconnected` waits until the session is `Closed`, so an
    // observer may call `connect` as soon as it sees it
    let (done, cause) = loop {
        generation += 1;
        let connection = Connection::new(&shared, established, generation, &link);
        match connection.run(&mut commands).await {
            (Outcome::Stop(done), cause) => break (done, Some(cause)),
            (Outcome::Retry, cause) if !shared.config.reconnect => break (None, Some(cause)),
            (Outcome::Retry, cause) => shared.emit(ClientEvent::Disconnected(cause)),
        };

        match reconnect(&shared, &mut backoff, &mut commands).await {
            Ok(next) => {
                established = next;
                shared.mark_established();
            }
            Err(done) => break (done, None),
        }
    };

    shared.detach(&link);
    commands.close();
    while let Ok(command) = commands.try_recv() {
        command.reject(ClientError::NotConnected);
    }
    shared.set_state(ConnectionState::Closed);
    tracing::debug!("Session task finished");

    if let Some(cause) = cause {
        shared.emit(ClientEvent::Disconnected(cause));
    }
    if let Some(done) = done {
        let _ = done.send(());
    }
}

/// Wait out the backoff and handshake again until connected
///
/// Returns `Err` when reconnection stops: a disconnect request arrived (carrying
/// its acknowledgment), the attempt limit was reached, or the failure cannot
/// be fixed by retrying.
async fn reconnect(
    shared: &Shared,
    backoff: &mut ExponentialBackoff,
    commands: &mut mpsc::Receiver<Command>,
) -> Result<Established, Option<oneshot::Sender<()>>> {
    loop {
        let Some(delay) = backoff.next_delay() else {
            tracing::error!(
                "Giving up on {} after {} reconnect attempts",
                shared.connector.endpoint(),
                backoff.attempts()
            );
            return Err(None);
        };

        shared.set_state(ConnectionState::Reconnecting);
        tracing::info!(
            "Reconnecting to {} in {:?} (attempt {})",
            shared.connector.endpoint(),
            delay,
            backoff.attempts()
        );
        if let Some(done) = wait_out(delay, commands).await {
            tracing::info!("Reconnect cancelled by disconnect request");
            return Err(Some(done));
        }

        match handshake(shared).await {
            Ok(established) => {
                tracing::info!("Reconnected to {}", shared.connector.endpoint());
                backoff.succeeded();
                return Ok(established);
            }
            Err(e) if !e.is_retryable() => {
                tracing::error!("Reconnect failed, not retrying: {}", e);
                return Err(None);
            }
            Err(e) => tracing::warn!("Reconnect attempt failed: {}", e),
        }
    }
}

/// Sleep for the backoff delay while turning away commands
///
/// Returns the acknowledgment of a disconnect request if one arrives first.
async fn wait_out(
    delay: Duration,
    commands: &mut mpsc::Receiver<Command>,
) -> Option<oneshot::Sender<()>> {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return None,
            command = commands.recv() => match command {
                Some(Command::Disconnect { done, .. }) => return Some(done),
                Some(command) => command.reject(ClientError::NotConnected),
                None => return None,
            },
        }
    }
}

/// One established connection
struct Connection<'a> {
    shared: &'a Shared,
    transport: Box<dyn Transport>,
    heartbeat: HeartbeatMonitor,
    table: CorrelationTable,
    /// Counts connections within the session, starting at 1
    generation: u64,
    link: &'a mpsc::Sender<Command>,
}

impl<'a> Connection<'a> {
    fn new(
        shared: &'a Shared,
        established: Established,
        generation: u64,
        link: &'a mpsc::Sender<Command>,
    ) -> Self {
        // The handshake ack is the first heartbeat
        let mut heartbeat = HeartbeatMonitor::new(established.heartbeat_interval);
        heartbeat.beat();
        Self {
            shared,
            transport: established.transport,
            heartbeat,
            table: CorrelationTable::new(),
            generation,
            link,
        }
    }

    async fn run(mut self, commands: &mut mpsc::Receiver<Command>) -> (Outcome, DisconnectCause) {
        let teardown = loop {
            tokio::select! {
                inbound = self.transport.recv() => {
                    let step = match inbound {
                        Ok(TransportEvent::Frame(frame)) => self.handle_frame(&frame).await,
                        Ok(TransportEvent::Malformed(reason)) => {
                            Some(Teardown::Fatal(ClientError::Decode(reason)))
                        }
                        Ok(TransportEvent::Closed(Some(code))) => {
                            Some(Teardown::Dropped(DisconnectCause::Code(code)))
                        }
                        Ok(TransportEvent::Closed(None)) => {
                            let cause = "connection closed without a close frame";
                            Some(Teardown::Dropped(DisconnectCause::Error(cause.into())))
                        }
                        Err(e) => Some(Teardown::Dropped(DisconnectCause::Error(e.to_string()))),
                    };
                    if let Some(teardown) = step {
                        break teardown;
                    }
                }
                command = commands.recv() => {
                    // The task holds a sender itself, so the channel stays open
                    let Some(command) = command else { continue };
                    if let Some(teardown) = self.handle_command(command).await {
                        break teardown;
                    }
                }
                event = self.heartbeat.next_event() => match event {
                    HeartbeatEvent::PingDue => {
                        self.heartbeat.ping_sent();
                        if let Some(teardown) = self.send(ClientMessage::Heartbeat).await {
                            break teardown;
                        }
                    }
                    HeartbeatEvent::PeerTimedOut => break Teardown::PeerTimeout,
                },
            }
        };

        self.close(teardown).await
    }

    async fn handle_frame(&mut self, frame: &str) -> Option<Teardown> {
        let message: ServerMessage = match decode(frame) {
            Ok(message) => message,
            Err(e) => return Some(Teardown::Fatal(ClientError::from_inbound(e))),
        };
        tracing::trace!("Received {:?}", message.op());

        if self.table.observe(&message) {
            return None;
        }
        match dispatch(message) {
            Dispatch::Heartbeat => {
                self.heartbeat.beat();
                None
            }
            Dispatch::Event(event) => {
                self.shared.emit(event);
                None
            }
            Dispatch::Query(query) => self.handle_query(query).await,
            Dispatch::Ignored => None,
            Dispatch::Fatal(err) => Some(Teardown::Fatal(err)),
        }
    }

    async fn handle_query(&mut self, query: CccPropagate) -> Option<Teardown> {
        let delivered = {
            let mut events = self.shared.events();
            if events.has_listeners(EventKind::CccQuery) {
                let event = CccQuery::new(
                    query.id.clone(),
                    query.data,
                    self.generation,
                    self.link.clone(),
                );
                events.emit(ClientEvent::CccQuery(event)) > 0
            } else {
                false
            }
        };
        if delivered {
            return None;
        }

        tracing::debug!("No query observer, answering CCC {} as unhandled", query.id);
        self.send(ClientMessage::CccReturn(CccReply {
            id: query.id,
            data: UNHANDLED_QUERY_REPLY.to_string(),
        }))
        .await
    }

    async fn handle_command(&mut self, command: Command) -> Option<Teardown> {
        match command {
            Command::SendData {
                kind,
                data,
                responder,
            } => {
                self.table.expect_data_ack(responder);
                self.send(ClientMessage::SendData(SendData { kind, data })).await
            }
            Command::StartCcc {
                target,
                data,
                responder,
            } => {
                self.table.expect_confirm(target, responder);
                self.send(ClientMessage::CccBegin(CccBegin { to: target, data }))
                    .await
            }
            Command::ReplyQuery {
                id,
                data,
                generation,
            } => {
                if generation != self.generation {
                    tracing::debug!("Dropping reply to CCC {} from an earlier connection", id);
                    return None;
                }
                self.send(ClientMessage::CccReturn(CccReply { id, data })).await
            }
            Command::Disconnect { reason, done } => Some(Teardown::Requested { reason, done }),
        }
    }

    async fn send(&mut self, message: ClientMessage) -> Option<Teardown> {
        match send_message(self.transport.as_mut(), &message).await {
            Ok(()) => None,
            Err(ClientError::Transport(e)) => Some(Teardown::Dropped(DisconnectCause::Error(e))),
            Err(e) => Some(Teardown::Fatal(e)),
        }
    }

    /// Close the transport and reject pending calls
    ///
    /// Telling observers is left to the caller, which knows whether the
    /// session continues.
    async fn close(mut self, teardown: Teardown) -> (Outcome, DisconnectCause) {
        self.shared.set_state(ConnectionState::Closing);
        self.heartbeat.stop();

        let (code, cause, pending_error, outcome) = match teardown {
            Teardown::Requested { reason, done } => {
                let code = ClientCloseCode::from(reason);
                tracing::info!("Disconnecting with {}", code);
                (
                    Some(code),
                    DisconnectCause::Code(code.as_u16()),
                    ClientError::ConnectionClosed,
                    Outcome::Stop(Some(done)),
                )
            }
            Teardown::PeerTimeout => {
                tracing::warn!(
                    "No heartbeat from server within {:?}, closing",
                    self.heartbeat.interval()
                );
                let code = ClientCloseCode::Normal;
                (
                    Some(code),
                    DisconnectCause::Code(code.as_u16()),
                    ClientError::PeerTimeout,
                    Outcome::Retry,
                )
            }
            Teardown::Fatal(err) => {
                tracing::error!("Closing connection: {}", err);
                let code = ClientCloseCode::Abnormal;
                (
                    Some(code),
                    DisconnectCause::Code(code.as_u16()),
                    err,
                    Outcome::Retry,
                )
            }
            Teardown::Dropped(cause) => {
                tracing::warn!("Connection lost: {}", cause);
                (None, cause, ClientError::ConnectionClosed, Outcome::Retry)
            }
        };

        if let Some(code) = code {
            if let Err(e) = self.transport.close(code).await {
                tracing::debug!("Failed to close transport: {}", e);
            }
        }

        let pending = self.table.len();
        if pending > 0 {
            tracing::debug!("Rejecting {} pending calls: {}", pending, pending_error);
        }
        self.table.reject_all(&pending_error);

        (outcome, cause)
    }
}
