//! cl-client: Cluster member session client for clusterlink
//!
//! A cluster member keeps one WebSocket connection to the coordinating
//! server. Over it the member proves its identity, keeps the connection
//! alive with heartbeats, pushes data, and exchanges cross-cluster (CCC)
//! queries with the other members.

pub mod client;
pub mod correlation;
pub mod error;
pub mod events;
pub mod heartbeat;
pub mod reconnect;
pub mod session;
pub mod transport;

pub use client::ClusterClient;
pub use correlation::CccResponse;
pub use error::ClientError;
pub use events::{CccQuery, ClientEvent, DisconnectCause, EventKind, ListenerId, Subscription};
pub use session::ConnectionState;
