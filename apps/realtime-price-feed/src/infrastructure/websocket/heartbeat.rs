//! Heartbeat Monitor
//!
//! Tracks link liveness for one WebSocket connection. The connection loop
//! awaits [`HeartbeatMonitor::tick`] alongside its reads and writes; each tick
//! either asks for a ping or reports that the link has gone silent.

use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior};

/// Configuration for heartbeat behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Interval between pings. Zero disables the heartbeat.
    pub interval: Duration,
    /// Silence after which the link is considered dead.
    pub timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(60),
        }
    }
}

impl HeartbeatConfig {
    /// Create a configuration with custom values.
    #[must_use]
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Heartbeat that never pings and never times out.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            interval: Duration::ZERO,
            timeout: Duration::ZERO,
        }
    }

    /// Whether pings are enabled.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        !self.interval.is_zero()
    }
}

/// What the connection loop should do after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatAction {
    /// Send a ping frame.
    Ping,
    /// Nothing was heard within the timeout; close the link.
    TimedOut {
        /// Time since the last inbound frame.
        silent_for: Duration,
    },
}

/// Per-connection heartbeat state.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    config: HeartbeatConfig,
    interval: Option<Interval>,
    last_activity: Instant,
}

impl HeartbeatMonitor {
    /// Create a monitor. The first ping fires one interval after creation.
    ///
    /// An interval too large to schedule disables the heartbeat.
    #[must_use]
    pub fn new(config: HeartbeatConfig) -> Self {
        let start = config
            .is_enabled()
            .then(|| Instant::now().checked_add(config.interval))
            .flatten();
        if config.is_enabled() && start.is_none() {
            tracing::warn!(
                interval_secs = config.interval.as_secs(),
                "Heartbeat interval out of range, heartbeat disabled"
            );
        }

        let interval = start.map(|start| {
            let mut interval = tokio::time::interval_at(start, config.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval
        });

        Self {
            config,
            interval,
            last_activity: Instant::now(),
        }
    }

    /// Record any inbound frame (data, ping or pong).
    pub fn record_activity(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Time since the last inbound frame.
    #[must_use]
    pub fn silent_for(&self) -> Duration {
        self.last_activity.elapsed()
    }

    /// Wait for the next heartbeat tick. Pends forever when disabled.
    pub async fn tick(&mut self) -> HeartbeatAction {
        let Some(interval) = self.interval.as_mut() else {
            return std::future::pending().await;
        };
        interval.tick().await;

        let silent_for = self.last_activity.elapsed();
        if !self.config.timeout.is_zero() && silent_for >= self.config.timeout {
            tracing::warn!(
                silent_secs = silent_for.as_secs(),
                timeout_secs = self.config.timeout.as_secs(),
                "Heartbeat timeout detected"
            );
            return HeartbeatAction::TimedOut { silent_for };
        }

        HeartbeatAction::Ping
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = HeartbeatConfig::default();
        assert_eq!(config.interval, Duration::from_secs(30));
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert!(config.is_enabled());
        assert!(!HeartbeatConfig::disabled().is_enabled());
    }

    #[tokio::test(start_paused = true)]
    async fn pings_each_interval_while_active() {
        let mut monitor = HeartbeatMonitor::new(HeartbeatConfig::new(
            Duration::from_secs(30),
            Duration::from_secs(60),
        ));

        assert_eq!(monitor.tick().await, HeartbeatAction::Ping);
        monitor.record_activity();
        assert_eq!(monitor.tick().await, HeartbeatAction::Ping);
        monitor.record_activity();
        assert_eq!(monitor.tick().await, HeartbeatAction::Ping);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_after_silence() {
        let mut monitor = HeartbeatMonitor::new(HeartbeatConfig::new(
            Duration::from_secs(30),
            Duration::from_secs(60),
        ));

        assert_eq!(monitor.tick().await, HeartbeatAction::Ping);
        assert!(matches!(
            monitor.tick().await,
            HeartbeatAction::TimedOut { silent_for } if silent_for >= Duration::from_secs(60)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn unschedulable_interval_disables_instead_of_panicking() {
        let mut monitor = HeartbeatMonitor::new(HeartbeatConfig::new(
            Duration::from_secs(u64::MAX),
            Duration::from_secs(60),
        ));
        let result = tokio::time::timeout(Duration::from_secs(3600), monitor.tick()).await;
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_monitor_never_ticks() {
        let mut monitor = HeartbeatMonitor::new(HeartbeatConfig::disabled());
        let result = tokio::time::timeout(Duration::from_secs(3600), monitor.tick()).await;
        assert!(result.is_err());
    }
}
