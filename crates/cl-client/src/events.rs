//! Client events and the observer registry
//!
//! Observers receive events over unbounded channels so that delivery never
//! blocks the session task. A listener whose receiver was dropped is pruned
//! on the next delivery.

use std::fmt;

use tokio::sync::mpsc;

use cl_protocol::describe_close_code;

use crate::error::ClientError;
use crate::session::Command;

/// Event categories observers can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connected,
    Disconnected,
    ClusterStatus,
    CccQuery,
    DataPushed,
}

impl EventKind {
    /// Everything except queries
    ///
    /// Queries expect an answer, so receiving them is opt-in: a member with
    /// no query observer answers `"Unhandled"` automatically.
    pub const NOTIFICATIONS: &'static [EventKind] = &[
        EventKind::Connected,
        EventKind::Disconnected,
        EventKind::ClusterStatus,
        EventKind::DataPushed,
    ];
}

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectCause {
    /// Closed with this close code
    Code(u16),
    /// The connection failed without a close code
    Error(String),
}

impl fmt::Display for DisconnectCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectCause::Code(code) => {
                write!(f, "code {} ({})", code, describe_close_code(*code))
            }
            DisconnectCause::Error(message) => write!(f, "{}", message),
        }
    }
}

/// Something observers may want to know about
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// The handshake completed
    Connected,
    /// The session ended
    Disconnected(DisconnectCause),
    /// Cluster membership changed
    ClusterStatus { count: u32, connected: Vec<u32> },
    /// Another member asked us something
    CccQuery(CccQuery),
    /// The server has new data
    DataPushed,
}

impl ClientEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ClientEvent::Connected => EventKind::Connected,
            ClientEvent::Disconnected(_) => EventKind::Disconnected,
            ClientEvent::ClusterStatus { .. } => EventKind::ClusterStatus,
            ClientEvent::CccQuery(_) => EventKind::CccQuery,
            ClientEvent::DataPushed => EventKind::DataPushed,
        }
    }
}

/// A query propagated from another cluster member
///
/// Every observer gets a copy; each reply is sent to the server as a
/// separate `CCCReturn`.
#[derive(Debug, Clone)]
pub struct CccQuery {
    id: String,
    data: String,
    generation: u64,
    commands: mpsc::Sender<Command>,
}

impl CccQuery {
    pub(crate) fn new(
        id: String,
        data: String,
        generation: u64,
        commands: mpsc::Sender<Command>,
    ) -> Self {
        Self {
            id,
            data,
            generation,
            commands,
        }
    }

    /// Server-issued correlation id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Query text
    pub fn data(&self) -> &str {
        &self.data
    }

    /// Answer the query
    ///
    /// Fails with [`ClientError::NotConnected`] if the session that delivered
    /// the query has ended. After a reconnect the new server session never
    /// issued this id, so the reply is dropped instead of sent.
    pub async fn reply(&self, answer: impl Into<String>) -> Result<(), ClientError> {
        self.commands
            .send(Command::ReplyQuery {
                id: self.id.clone(),
                data: answer.into(),
                generation: self.generation,
            })
            .await
            .map_err(|_| ClientError::NotConnected)
    }
}

/// Identifies a subscription for [`EventBus::unsubscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// Receiving end of a subscription
#[derive(Debug)]
pub struct Subscription {
    id: ListenerId,
    rx: mpsc::UnboundedReceiver<ClientEvent>,
}

impl Subscription {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Wait for the next event
    ///
    /// Returns `None` after the subscription was removed.
    pub async fn recv(&mut self) -> Option<ClientEvent> {
        self.rx.recv().await
    }

    /// Take an already delivered event without waiting
    pub fn try_recv(&mut self) -> Option<ClientEvent> {
        self.rx.try_recv().ok()
    }
}

struct Listener {
    id: ListenerId,
    kinds: Vec<EventKind>,
    tx: mpsc::UnboundedSender<ClientEvent>,
}

/// Observer registry, delivering in subscription order
#[derive(Default)]
pub struct EventBus {
    next_id: u64,
    listeners: Vec<Listener>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, kinds: &[EventKind]) -> Subscription {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners.push(Listener {
            id,
            kinds: kinds.to_vec(),
            tx,
        });
        Subscription { id, rx }
    }

    /// Remove a subscription; its receiver sees the end of the stream
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|listener| listener.id != id);
        self.listeners.len() != before
    }

    /// Whether anyone still listens for this kind of event
    pub fn has_listeners(&mut self, kind: EventKind) -> bool {
        self.prune();
        self.listeners.iter().any(|l| l.kinds.contains(&kind))
    }

    /// Deliver an event, returning how many observers received it
    pub fn emit(&mut self, event: ClientEvent) -> usize {
        let kind = event.kind();
        let mut delivered = 0;
        self.listeners.retain(|listener| {
            if !listener.kinds.contains(&kind) {
                return !listener.tx.is_closed();
            }
            match listener.tx.send(event.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(_) => false,
            }
        });
        delivered
    }

    fn prune(&mut self) {
        self.listeners.retain(|listener| !listener.tx.is_closed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_filters_by_kind() {
        let mut bus = EventBus::new();
        let mut all = bus.subscribe(EventKind::NOTIFICATIONS);
        let mut pushes = bus.subscribe(&[EventKind::DataPushed]);

        assert_eq!(bus.emit(ClientEvent::Connected), 1);
        assert_eq!(bus.emit(ClientEvent::DataPushed), 2);

        assert!(matches!(all.try_recv(), Some(ClientEvent::Connected)));
        assert!(matches!(all.try_recv(), Some(ClientEvent::DataPushed)));
        assert!(matches!(pushes.try_recv(), Some(ClientEvent::DataPushed)));
        assert!(pushes.try_recv().is_none());
    }

    #[test]
    fn test_unsubscribe_ends_stream() {
        let mut bus = EventBus::new();
        let mut sub = bus.subscribe(EventKind::NOTIFICATIONS);
        assert!(bus.unsubscribe(sub.id()));
        assert!(!bus.unsubscribe(sub.id()));

        assert_eq!(bus.emit(ClientEvent::DataPushed), 0);
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn test_dropped_listeners_are_pruned() {
        let mut bus = EventBus::new();
        let queries = bus.subscribe(&[EventKind::CccQuery]);
        assert!(bus.has_listeners(EventKind::CccQuery));
        assert!(!bus.has_listeners(EventKind::DataPushed));

        drop(queries);
        assert!(!bus.has_listeners(EventKind::CccQuery));
    }

    #[test]
    fn test_notifications_exclude_queries() {
        assert!(!EventKind::NOTIFICATIONS.contains(&EventKind::CccQuery));
        assert_eq!(
            DisconnectCause::Code(4006).to_string(),
            "code 4006 (heartbeat timeout)"
        );
    }
}
