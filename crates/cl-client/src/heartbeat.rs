//! Heartbeat monitor
//!
//! Every heartbeat from the server re-arms two timers: a ping at half the
//! negotiated interval and a watchdog at the full interval. A heartbeat that
//! arrives before the watchdog fires cancels both and starts over.

use std::time::Duration;

use tokio::time::Instant;

/// What the monitor wants done next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatEvent {
    /// Half the interval passed since the last server heartbeat
    PingDue,
    /// A full interval passed without a server heartbeat
    PeerTimedOut,
}

/// Liveness timers for one established connection
#[derive(Debug)]
pub struct HeartbeatMonitor {
    interval: Duration,
    ping_at: Option<Instant>,
    deadline: Option<Instant>,
}

impl HeartbeatMonitor {
    /// Create a stopped monitor for the given interval
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            ping_at: None,
            deadline: None,
        }
    }

    /// Negotiated heartbeat interval
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Record a heartbeat from the server and re-arm both timers
    pub fn beat(&mut self) {
        let now = Instant::now();
        self.ping_at = Some(now + self.interval / 2);
        self.deadline = Some(now + self.interval);
    }

    /// Record that our ping went out; the watchdog keeps running
    pub fn ping_sent(&mut self) {
        self.ping_at = None;
    }

    /// Disarm both timers
    pub fn stop(&mut self) {
        self.ping_at = None;
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Wait for the next timer to fire
    ///
    /// Pending forever while stopped. Cancel safe: dropping the future
    /// leaves the timers untouched.
    pub async fn next_event(&self) -> HeartbeatEvent {
        let (at, event) = match (self.ping_at, self.deadline) {
            (Some(ping), Some(deadline)) if ping < deadline => (ping, HeartbeatEvent::PingDue),
            (_, Some(deadline)) => (deadline, HeartbeatEvent::PeerTimedOut),
            (Some(ping), None) => (ping, HeartbeatEvent::PingDue),
            (None, None) => return std::future::pending().await,
        };
        tokio::time::sleep_until(at).await;
        event
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_ping_then_timeout() {
        let mut monitor = HeartbeatMonitor::new(Duration::from_millis(1000));
        let start = Instant::now();
        monitor.beat();

        assert_eq!(monitor.next_event().await, HeartbeatEvent::PingDue);
        assert_eq!(start.elapsed(), Duration::from_millis(500));
        monitor.ping_sent();

        assert_eq!(monitor.next_event().await, HeartbeatEvent::PeerTimedOut);
        assert_eq!(start.elapsed(), Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_beat_before_deadline_restarts_timers() {
        let mut monitor = HeartbeatMonitor::new(Duration::from_millis(1000));
        monitor.beat();
        assert_eq!(monitor.next_event().await, HeartbeatEvent::PingDue);
        monitor.ping_sent();

        tokio::time::sleep(Duration::from_millis(499)).await;
        let renewed = Instant::now();
        monitor.beat();

        assert_eq!(monitor.next_event().await, HeartbeatEvent::PingDue);
        assert_eq!(renewed.elapsed(), Duration::from_millis(500));
        monitor.ping_sent();
        assert_eq!(monitor.next_event().await, HeartbeatEvent::PeerTimedOut);
        assert_eq!(renewed.elapsed(), Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_monitor_never_fires() {
        let mut monitor = HeartbeatMonitor::new(Duration::from_millis(10));
        monitor.beat();
        monitor.stop();
        assert!(!monitor.is_armed());

        let fired = tokio::time::timeout(Duration::from_secs(60), monitor.next_event()).await;
        assert!(fired.is_err());
    }
}
