//! Exponential backoff for reconnection

use std::time::Duration;

use cl_core::BackoffConfig;

/// Exponential backoff with optional cap, jitter and attempt limit
pub struct ExponentialBackoff {
    /// First delay, and the delay after a reset
    initial: Duration,
    /// Current delay
    current: Duration,
    /// Maximum delay
    max: Option<Duration>,
    /// Multiplier
    multiplier: f64,
    /// Jitter factor (0.0 to 1.0)
    jitter: f64,
    /// Consecutive attempts allowed before giving up
    max_attempts: Option<u32>,
    /// Consecutive attempts made so far
    attempts: u32,
    /// Whether a successful connection restores the initial delay
    reset_on_success: bool,
}

impl ExponentialBackoff {
    /// Create a new backoff from configuration
    pub fn from_config(config: &BackoffConfig) -> Self {
        Self {
            initial: config.initial,
            current: config.initial,
            max: config.max,
            multiplier: config.multiplier,
            jitter: config.jitter,
            max_attempts: config.max_attempts,
            attempts: 0,
            reset_on_success: config.reset_on_success,
        }
    }

    /// Create an unbounded backoff without jitter
    pub fn new(initial: Duration, multiplier: f64) -> Self {
        Self::from_config(&BackoffConfig {
            initial,
            multiplier,
            ..BackoffConfig::default()
        })
    }

    /// Get the next delay and advance the backoff
    ///
    /// Returns `None` once `max_attempts` consecutive attempts have been made.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.max_attempts.is_some_and(|max| self.attempts >= max) {
            return None;
        }
        self.attempts += 1;

        let delay = self.capped(self.current);

        // Saturate instead of overflowing after many unbounded attempts
        let next = Duration::try_from_secs_f64(self.current.as_secs_f64() * self.multiplier)
            .unwrap_or(Duration::MAX);
        self.current = self.capped(next);

        if self.jitter > 0.0 {
            let jitter_amount = delay.as_secs_f64() * self.jitter * rand::random::<f64>();
            let jitter = Duration::try_from_secs_f64(jitter_amount).unwrap_or_default();
            Some(delay.saturating_add(jitter))
        } else {
            Some(delay)
        }
    }

    /// Consecutive attempts made since the last success
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Record a successful connection
    pub fn succeeded(&mut self) {
        self.attempts = 0;
        if self.reset_on_success {
            self.current = self.initial;
        }
    }

    /// Reset the backoff to its initial delay
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.current = self.initial;
    }

    fn capped(&self, delay: Duration) -> Duration {
        match self.max {
            Some(max) => delay.min(max),
            None => delay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_increases() {
        let mut backoff = ExponentialBackoff::new(Duration::from_secs(5), 1.25);

        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(5)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(6250)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_micros(7_812_500)));
        assert_eq!(backoff.attempts(), 3);
    }

    #[test]
    fn test_backoff_follows_geometric_series() {
        let initial = Duration::from_secs(5);
        let mut backoff = ExponentialBackoff::new(initial, 1.25);

        for n in 0..20 {
            let expected = initial.as_secs_f64() * 1.25f64.powi(n);
            let actual = backoff.next_delay().unwrap().as_secs_f64();
            assert!(
                (actual - expected).abs() < 1e-6,
                "attempt {}: expected {}, got {}",
                n,
                expected,
                actual
            );
        }
    }

    #[test]
    fn test_backoff_max() {
        let mut backoff = ExponentialBackoff::from_config(&BackoffConfig {
            initial: Duration::from_secs(30),
            multiplier: 2.0,
            max: Some(Duration::from_secs(60)),
            ..BackoffConfig::default()
        });

        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(30)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(60))); // Capped at max
        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(60))); // Still capped
    }

    #[test]
    fn test_backoff_gives_up_after_max_attempts() {
        let mut backoff = ExponentialBackoff::from_config(&BackoffConfig {
            initial: Duration::from_secs(1),
            max_attempts: Some(2),
            ..BackoffConfig::default()
        });

        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_some());
        assert_eq!(backoff.next_delay(), None);

        backoff.succeeded();
        assert!(backoff.next_delay().is_some());
    }

    #[test]
    fn test_success_keeps_growth_unless_configured() {
        let mut backoff = ExponentialBackoff::new(Duration::from_secs(4), 1.25);
        backoff.next_delay();
        backoff.succeeded();
        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(5)));

        let mut resetting = ExponentialBackoff::from_config(&BackoffConfig {
            initial: Duration::from_secs(4),
            reset_on_success: true,
            ..BackoffConfig::default()
        });
        resetting.next_delay();
        resetting.succeeded();
        assert_eq!(resetting.next_delay(), Some(Duration::from_secs(4)));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let mut backoff = ExponentialBackoff::from_config(&BackoffConfig {
            initial: Duration::from_secs(2),
            multiplier: 1.0,
            jitter: 0.5,
            ..BackoffConfig::default()
        });

        for _ in 0..50 {
            let delay = backoff.next_delay().unwrap();
            assert!(delay >= Duration::from_secs(2));
            assert!(delay <= Duration::from_secs(3));
        }
    }

    #[test]
    fn test_unbounded_growth_saturates() {
        let mut backoff = ExponentialBackoff::new(Duration::from_secs(5), 1.25);
        for _ in 0..400 {
            assert!(backoff.next_delay().is_some());
        }
        backoff.reset();
        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(5)));
    }
}
