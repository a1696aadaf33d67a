//! Cluster member configuration

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use super::backoff::BackoffConfig;
use super::serde_utils::duration_millis;
use crate::error::ConfigError;

/// Transport used to reach the coordinating server
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportKind {
    /// JSON frames over a WebSocket
    #[default]
    #[serde(rename = "ws")]
    WebSocket,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::WebSocket => write!(f, "ws"),
        }
    }
}

/// Placement of this member within the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// This member's cluster id, `0..count`
    pub id: u32,
    /// Total number of clusters
    pub count: u32,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self { id: 0, count: 1 }
    }
}

/// Configuration for a cluster member
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Coordinating server endpoint
    pub url: String,

    /// Authentication token sent in `Identity`
    pub token: String,

    /// Cluster placement
    pub cluster: ClusterConfig,

    /// Reconnect after the connection drops
    pub reconnect: bool,

    /// Backoff configuration for reconnections
    pub backoff: BackoffConfig,

    /// Upper bound on the whole handshake
    #[serde(with = "duration_millis")]
    pub handshake_timeout: Duration,

    /// Transport implementation
    pub transport: TransportKind,

    /// JSON file holding the local schema descriptor
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_path: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8000/manager".to_string(),
            token: String::new(),
            cluster: ClusterConfig::default(),
            reconnect: true,
            backoff: BackoffConfig::default(),
            handshake_timeout: Duration::from_secs(30),
            transport: TransportKind::default(),
            schema_path: None,
        }
    }
}

// The token stays out of logs
impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("url", &self.url)
            .field("token", &"<redacted>")
            .field("cluster", &self.cluster)
            .field("reconnect", &self.reconnect)
            .field("backoff", &self.backoff)
            .field("handshake_timeout", &self.handshake_timeout)
            .field("transport", &self.transport)
            .field("schema_path", &self.schema_path)
            .finish()
    }
}

impl ClientConfig {
    /// Check the configuration for values the server would reject
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::Invalid("url must not be empty".into()));
        }
        if self.cluster.count == 0 {
            return Err(ConfigError::Invalid("cluster.count must be at least 1".into()));
        }
        if self.cluster.id >= self.cluster.count {
            return Err(ConfigError::Invalid(format!(
                "cluster.id {} is outside 0..{}",
                self.cluster.id, self.cluster.count
            )));
        }
        if self.backoff.multiplier.is_nan() || self.backoff.multiplier < 1.0 {
            return Err(ConfigError::Invalid(
                "backoff.multiplier must be at least 1.0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.backoff.jitter) {
            return Err(ConfigError::Invalid(
                "backoff.jitter must be between 0.0 and 1.0".into(),
            ));
        }
        if self.handshake_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "handshake_timeout must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ClientConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.reconnect);
        assert_eq!(config.transport, TransportKind::WebSocket);
    }

    #[test]
    fn test_validate_cluster_placement() {
        let mut config = ClientConfig::default();
        config.cluster = ClusterConfig { id: 3, count: 3 };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.cluster = ClusterConfig { id: 0, count: 0 };
        assert!(config.validate().is_err());

        config.cluster = ClusterConfig { id: 2, count: 3 };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_backoff() {
        let mut config = ClientConfig::default();
        config.backoff.multiplier = 0.5;
        assert!(config.validate().is_err());

        config.backoff.multiplier = 1.25;
        config.backoff.jitter = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_toml() {
        let config: ClientConfig = toml::from_str(
            r#"
            url = "ws://10.0.0.2:8000/manager"
            token = "abc"
            reconnect = false
            transport = "ws"
            handshake_timeout = 5000

            [cluster]
            id = 1
            count = 4
            "#,
        )
        .unwrap();

        assert_eq!(config.url, "ws://10.0.0.2:8000/manager");
        assert_eq!(config.cluster, ClusterConfig { id: 1, count: 4 });
        assert!(!config.reconnect);
        assert_eq!(config.handshake_timeout, Duration::from_secs(5));
        assert_eq!(config.backoff, BackoffConfig::default());
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = ClientConfig {
            token: "hunter2".into(),
            ..Default::default()
        };
        let debug = format!("{:?}", config);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }
}
