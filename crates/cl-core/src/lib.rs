//! cl-core: Configuration for clusterlink
//!
//! This crate provides the configuration structures shared by the client
//! library and the `cl-client` binary, along with TOML loading and saving.

pub mod config;
pub mod error;

pub use config::{BackoffConfig, ClientConfig, ClusterConfig, TransportKind};
pub use error::ConfigError;
