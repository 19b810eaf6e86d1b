//! Server-wide counters

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

/// Server-wide statistics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStats {
    /// Publish handshakes seen by the gate
    pub publish_attempts: u64,
    /// Handshakes refused, by the gate or during setup
    pub publishes_rejected: u64,
    /// Sessions that reached `Live`
    pub sessions_started: u64,
    /// Transcoder launches that failed
    pub spawn_failures: u64,
    /// Sessions registered right now
    pub active_streams: u64,
    #[serde(skip)]
    pub uptime: Duration,
}

/// Lock-free counters behind [`ServerStats`]
#[derive(Debug)]
pub(crate) struct Counters {
    started_at: Instant,
    publish_attempts: AtomicU64,
    publishes_rejected: AtomicU64,
    sessions_started: AtomicU64,
    spawn_failures: AtomicU64,
}

impl Counters {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            publish_attempts: AtomicU64::new(0),
            publishes_rejected: AtomicU64::new(0),
            sessions_started: AtomicU64::new(0),
            spawn_failures: AtomicU64::new(0),
        }
    }

    pub fn publish_attempt(&self) {
        self.publish_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rejected(&self) {
        self.publishes_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_started(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn spawn_failed(&self) {
        self.spawn_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, active_streams: usize) -> ServerStats {
        ServerStats {
            publish_attempts: self.publish_attempts.load(Ordering::Relaxed),
            publishes_rejected: self.publishes_rejected.load(Ordering::Relaxed),
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            spawn_failures: self.spawn_failures.load(Ordering::Relaxed),
            active_streams: active_streams as u64,
            uptime: self.started_at.elapsed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_stats_new() {
        let stats = Counters::new().snapshot(0);
        assert_eq!(stats.publish_attempts, 0);
        assert_eq!(stats.publishes_rejected, 0);
        assert_eq!(stats.sessions_started, 0);
        assert_eq!(stats.spawn_failures, 0);
        assert_eq!(stats.active_streams, 0);
    }

    #[test]
    fn test_counters() {
        let counters = Counters::new();
        counters.publish_attempt();
        counters.publish_attempt();
        counters.rejected();
        counters.session_started();
        counters.spawn_failed();

        let stats = counters.snapshot(1);
        assert_eq!(stats.publish_attempts, 2);
        assert_eq!(stats.publishes_rejected, 1);
        assert_eq!(stats.sessions_started, 1);
        assert_eq!(stats.spawn_failures, 1);
        assert_eq!(stats.active_streams, 1);
    }
}
