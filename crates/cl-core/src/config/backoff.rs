//! Reconnection backoff configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::serde_utils::{duration_millis, option_duration_millis};

/// Exponential backoff configuration
///
/// The defaults start at five seconds and grow by a quarter after every
/// attempt, with no cap, no attempt limit and no reset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Delay before the first reconnect attempt
    #[serde(with = "duration_millis")]
    pub initial: Duration,

    /// Multiplier applied after each attempt
    pub multiplier: f64,

    /// Upper bound on the delay
    #[serde(
        with = "option_duration_millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub max: Option<Duration>,

    /// Give up after this many consecutive failed attempts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,

    /// Jitter factor (0.0 to 1.0)
    pub jitter: f64,

    /// Start over from `initial` after a successful reconnect
    pub reset_on_success: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(5),
            multiplier: 1.25,
            max: None,
            max_attempts: None,
            jitter: 0.0,
            reset_on_success: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_defaults() {
        let backoff = BackoffConfig::default();
        assert_eq!(backoff.initial, Duration::from_secs(5));
        assert_eq!(backoff.multiplier, 1.25);
        assert!(backoff.max.is_none());
        assert!(backoff.max_attempts.is_none());
        assert!(!backoff.reset_on_success);
    }

    #[test]
    fn test_backoff_partial_toml() {
        let backoff: BackoffConfig = toml::from_str("initial = 250\nmax_attempts = 3").unwrap();
        assert_eq!(backoff.initial, Duration::from_millis(250));
        assert_eq!(backoff.max_attempts, Some(3));
        assert_eq!(backoff.multiplier, 1.25);
    }
}
