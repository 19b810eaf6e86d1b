//! Event bus implementation
//!
//! Backed by `tokio::sync::broadcast`: emitting never waits on subscribers, and
//! a subscriber that falls behind loses the oldest events instead of stalling
//! the registry.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

use crate::stream::{ConnectionId, StreamKey};

use super::event::{current_timestamp, EventKind, LifecycleEvent};

/// Default number of events retained for slow subscribers
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Ordered, non-blocking fan-out of lifecycle events
///
/// Cheap to clone; all clones share the same channel and sequence counter.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<LifecycleEvent>,
    next_seq: Arc<AtomicU64>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            next_seq: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Emit an event for a parsed stream key
    pub fn emit(&self, connection_id: ConnectionId, key: &StreamKey, kind: EventKind) -> u64 {
        self.send(connection_id, Some(key.clone()), key.stream_path(), kind)
    }

    /// Emit an event for a publish path that never became a key
    pub fn emit_unkeyed(&self, connection_id: ConnectionId, stream_path: &str, kind: EventKind) -> u64 {
        self.send(connection_id, None, stream_path.to_string(), kind)
    }

    fn send(
        &self,
        connection_id: ConnectionId,
        key: Option<StreamKey>,
        stream_path: String,
        kind: EventKind,
    ) -> u64 {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            seq = seq,
            event = kind.name(),
            stream = %stream_path,
            connection_id = %connection_id,
            "Lifecycle event"
        );

        let event = LifecycleEvent {
            seq,
            key,
            stream_path,
            connection_id,
            kind,
            at: current_timestamp(),
        };

        // No receivers is not an error: delivery is best-effort
        let _ = self.tx.send(event);
        seq
    }

    /// Subscribe to every event emitted from now on
    pub fn subscribe(&self) -> EventSubscription {
        EventSubscription {
            rx: self.tx.subscribe(),
            filter: None,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side of the event bus
pub struct EventSubscription {
    rx: broadcast::Receiver<LifecycleEvent>,
    filter: Option<StreamKey>,
}

impl EventSubscription {
    /// Only deliver events for `key`
    pub fn for_key(mut self, key: StreamKey) -> Self {
        self.filter = Some(key);
        self
    }

    /// Wait for the next matching event
    ///
    /// Returns `None` once every bus handle has been dropped.
    pub async fn recv(&mut self) -> Option<LifecycleEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped = skipped, "Event subscriber lagged, events dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next matching event if one is already queued
    pub fn try_recv(&mut self) -> Option<LifecycleEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if self.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped = skipped, "Event subscriber lagged, events dropped");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Drain every queued matching event
    pub fn drain(&mut self) -> Vec<LifecycleEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    fn matches(&self, event: &LifecycleEvent) -> bool {
        match &self.filter {
            Some(key) => event.is_for(key),
            None => true,
        }
    }
}
