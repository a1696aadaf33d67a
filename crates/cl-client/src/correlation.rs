//! Request/response correlation
//!
//! Three kinds of outstanding calls share one table:
//!
//! - `SendData` calls wait for a `DataACK`. Acks carry no id and are matched
//!   in send order.
//! - `CCCBegin` calls first wait for a `CCCConfirm`. Confirms carry the
//!   server-issued id but nothing linking them to a call, so they bind to
//!   the oldest query still waiting for one.
//! - Confirmed queries then wait for the `CCCReturn` with their id.

use std::collections::{HashMap, VecDeque};

use tokio::sync::oneshot;

use cl_protocol::{CccData, CccTarget, ServerMessage};

use crate::error::ClientError;

/// Where a pending call's result is delivered
pub(crate) type Responder<T> = oneshot::Sender<Result<T, ClientError>>;

/// Result of a cross-cluster query this member started
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CccResponse {
    /// Server-issued correlation id
    pub id: String,
    /// The reply; always [`CccData::Many`] for a broadcast
    pub data: CccData,
}

#[derive(Debug)]
struct PendingQuery {
    target: CccTarget,
    responder: Responder<CccResponse>,
}

/// Outstanding calls on one connection
#[derive(Debug, Default)]
pub(crate) struct CorrelationTable {
    data_acks: VecDeque<Responder<bool>>,
    awaiting_confirm: VecDeque<PendingQuery>,
    confirmed: HashMap<String, PendingQuery>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a `SendData` call awaiting its ack
    pub fn expect_data_ack(&mut self, responder: Responder<bool>) {
        self.data_acks.push_back(responder);
    }

    /// Register a `CCCBegin` call awaiting its confirm
    pub fn expect_confirm(&mut self, target: CccTarget, responder: Responder<CccResponse>) {
        self.awaiting_confirm.push_back(PendingQuery { target, responder });
    }

    /// Resolve pending calls from an inbound message
    ///
    /// Returns `true` when the message is a correlation frame, whether or not
    /// anything was waiting for it.
    pub fn observe(&mut self, message: &ServerMessage) -> bool {
        match message {
            ServerMessage::DataAck(ack) => {
                match self.data_acks.pop_front() {
                    Some(responder) => {
                        let _ = responder.send(Ok(ack.success));
                    }
                    None => tracing::debug!("DataACK with no pending send"),
                }
                true
            }
            ServerMessage::CccConfirm(confirm) => {
                match self.awaiting_confirm.pop_front() {
                    Some(query) => {
                        tracing::trace!("CCC {} confirmed for target {}", confirm.id, query.target);
                        if let Some(stale) = self.confirmed.insert(confirm.id.clone(), query) {
                            tracing::warn!("Server reused CCC id {}", confirm.id);
                            let _ = stale.responder.send(Err(ClientError::ProtocolViolation(
                                format!("CCC id {} was reissued", confirm.id),
                            )));
                        }
                    }
                    None => tracing::debug!("CCCConfirm {} with no pending query", confirm.id),
                }
                true
            }
            ServerMessage::CccReturn(result) => {
                match self.confirmed.remove(&result.id) {
                    Some(query) => {
                        let data = if query.target.is_broadcast() {
                            CccData::Many(result.data.clone().into_many())
                        } else {
                            result.data.clone()
                        };
                        let _ = query.responder.send(Ok(CccResponse {
                            id: result.id.clone(),
                            data,
                        }));
                    }
                    None => tracing::debug!("Ignoring CCCReturn for unknown id {}", result.id),
                }
                true
            }
            _ => false,
        }
    }

    /// Reject every outstanding call, returning how many were pending
    pub fn reject_all(&mut self, error: &ClientError) -> usize {
        let mut rejected = 0;
        for responder in self.data_acks.drain(..) {
            let _ = responder.send(Err(error.clone()));
            rejected += 1;
        }
        let queries = self
            .awaiting_confirm
            .drain(..)
            .chain(self.confirmed.drain().map(|(_, query)| query));
        for query in queries {
            let _ = query.responder.send(Err(error.clone()));
            rejected += 1;
        }
        rejected
    }

    /// Number of outstanding calls
    pub fn len(&self) -> usize {
        self.data_acks.len() + self.awaiting_confirm.len() + self.confirmed.len()
    }
}
