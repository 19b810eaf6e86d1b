//! Session registry implementation
//!
//! The single source of truth for what is live right now.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;

use crate::events::{EventBus, EventKind};
use crate::stream::{ConnectionId, PublishMetadata, StreamKey, StreamPhase};
use crate::transcode::PipelineHandle;

use super::entry::{SessionHandle, SessionSnapshot, StreamSession};
use super::error::{Detached, RegistryError};

#[derive(Default)]
struct Sessions {
    by_key: HashMap<StreamKey, StreamSession>,
    by_connection: HashMap<ConnectionId, StreamKey>,
}

impl Sessions {
    /// Remove an entry and move it to `Stopped`
    ///
    /// Events are emitted while the caller still holds the write lock, so a
    /// later publish under the same key can never observe its `prePublish`
    /// ahead of this `stopped`.
    fn remove(
        &mut self,
        key: &StreamKey,
        crash_code: Option<Option<i32>>,
        events: &EventBus,
    ) -> Option<StreamSession> {
        let mut session = self.by_key.remove(key)?;
        self.by_connection.remove(&session.connection_id);

        // Publishing -> Stopped and Live -> Stopped are both legal
        if let Err(e) = session.phase.transition(StreamPhase::Stopped) {
            tracing::warn!(stream = %key, error = %e, "Unexpected phase on release");
            session.phase = StreamPhase::Stopped;
        }

        if let Some(code) = crash_code {
            events.emit(session.connection_id, key, EventKind::PipelineCrashed { code });
        }
        events.emit(session.connection_id, key, EventKind::Stopped);

        Some(session)
    }
}

/// Central registry for all active publish sessions
///
/// Thread-safe via `RwLock`. Every mutation takes the write lock for a short,
/// bounded critical section and never awaits process I/O while holding it;
/// reporting reads share the read lock.
pub struct SessionRegistry {
    sessions: RwLock<Sessions>,

    /// Lifecycle notifications
    events: EventBus,

    next_session_id: AtomicU64,
}

impl SessionRegistry {
    /// Create an empty registry emitting on `events`
    pub fn new(events: EventBus) -> Self {
        Self {
            sessions: RwLock::new(Sessions::default()),
            events,
            next_session_id: AtomicU64::new(1),
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Atomically insert a new session for `key`
    ///
    /// Fails with `AlreadyExists` if another publisher holds the key, even if
    /// the publish gate saw it free a moment earlier.
    pub async fn commit(
        &self,
        key: StreamKey,
        connection_id: ConnectionId,
        metadata: PublishMetadata,
    ) -> Result<SessionHandle, RegistryError> {
        let mut sessions = self.sessions.write().await;

        if sessions.by_key.contains_key(&key) {
            tracing::warn!(
                stream = %key,
                connection_id = %connection_id,
                "Commit lost race, stream already exists"
            );
            return Err(RegistryError::AlreadyExists(key));
        }
        if sessions.by_connection.contains_key(&connection_id) {
            return Err(RegistryError::ConnectionBusy(connection_id));
        }

        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        let mut session = StreamSession::new(key.clone(), connection_id, session_id, metadata);
        session.phase.transition(StreamPhase::Publishing)?;
        let handle = session.handle();

        sessions.by_connection.insert(connection_id, key.clone());
        sessions.by_key.insert(key.clone(), session);

        tracing::info!(
            stream = %key,
            connection_id = %connection_id,
            session_id = session_id,
            "Session committed"
        );

        Ok(handle)
    }

    /// Hand a running pipeline to its session and mark it live
    ///
    /// If the session is gone (released while the transcoder was starting) or
    /// was replaced, the pipeline is handed back inside [`Detached`].
    pub async fn attach_pipeline(
        &self,
        handle: &SessionHandle,
        pipeline: PipelineHandle,
    ) -> Result<(), Detached> {
        let mut sessions = self.sessions.write().await;

        let session = match sessions.by_key.get_mut(&handle.key) {
            Some(s) if s.session_id == handle.session_id => s,
            _ => {
                return Err(Detached {
                    error: RegistryError::SessionNotFound(handle.key.clone()),
                    pipeline,
                })
            }
        };

        if let Err(e) = session.phase.transition(StreamPhase::Live) {
            return Err(Detached {
                error: e.into(),
                pipeline,
            });
        }

        tracing::info!(
            stream = %handle.key,
            connection_id = %handle.connection_id,
            pid = ?pipeline.pid(),
            "Session live"
        );

        session.pipeline = Some(pipeline);
        self.events
            .emit(handle.connection_id, &handle.key, EventKind::Published);

        Ok(())
    }

    /// Remove and return the session under `key`
    ///
    /// Idempotent: a second call returns `None`.
    pub async fn release(&self, key: &StreamKey) -> Option<StreamSession> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.remove(key, None, &self.events)?;

        tracing::info!(
            stream = %key,
            connection_id = %session.connection_id,
            uptime_ms = session.uptime().as_millis() as u64,
            "Session released"
        );
        Some(session)
    }

    /// Release the session only if it is still the one `handle` refers to
    pub async fn release_session(&self, handle: &SessionHandle) -> Option<StreamSession> {
        let mut sessions = self.sessions.write().await;

        let owned = sessions
            .by_key
            .get(&handle.key)
            .is_some_and(|s| s.session_id == handle.session_id);
        if !owned {
            return None;
        }

        let session = sessions.remove(&handle.key, None, &self.events)?;
        tracing::info!(
            stream = %handle.key,
            connection_id = %handle.connection_id,
            "Session released"
        );
        Some(session)
    }

    /// Release whatever session `connection_id` publishes, if any
    pub async fn release_connection(&self, connection_id: ConnectionId) -> Option<StreamSession> {
        let mut sessions = self.sessions.write().await;

        let key = sessions.by_connection.get(&connection_id)?.clone();
        let session = sessions.remove(&key, None, &self.events)?;

        tracing::info!(
            stream = %key,
            connection_id = %connection_id,
            uptime_ms = session.uptime().as_millis() as u64,
            "Session released on disconnect"
        );
        Some(session)
    }

    /// Release a session whose pipeline died on its own
    ///
    /// Only removes the entry if it still belongs to `session_id`, so a stale
    /// monitor can never tear down a newer publish under the same key.
    /// Emits `pipelineCrashed` followed by `stopped`.
    pub async fn release_crashed(
        &self,
        key: &StreamKey,
        session_id: u64,
        code: Option<i32>,
    ) -> Option<StreamSession> {
        let mut sessions = self.sessions.write().await;

        let owned = sessions
            .by_key
            .get(key)
            .is_some_and(|s| s.session_id == session_id);
        if !owned {
            return None;
        }

        let session = sessions.remove(key, Some(code), &self.events)?;
        tracing::error!(
            stream = %key,
            connection_id = %session.connection_id,
            exit_code = ?code,
            "Pipeline crashed, session released"
        );
        Some(session)
    }

    /// Look up a session
    pub async fn get(&self, key: &StreamKey) -> Option<SessionSnapshot> {
        let sessions = self.sessions.read().await;
        sessions.by_key.get(key).map(StreamSession::snapshot)
    }

    /// Key published by `connection_id`, if any
    pub async fn key_for_connection(&self, connection_id: ConnectionId) -> Option<StreamKey> {
        let sessions = self.sessions.read().await;
        sessions.by_connection.get(&connection_id).cloned()
    }

    pub async fn contains(&self, key: &StreamKey) -> bool {
        self.sessions.read().await.by_key.contains_key(key)
    }

    /// Point-in-time snapshot of every session
    ///
    /// The read lock is held only while cloning; each call yields a fresh
    /// snapshot.
    pub async fn list(&self) -> impl Iterator<Item = SessionSnapshot> {
        let sessions = self.sessions.read().await;
        let snapshot: Vec<SessionSnapshot> =
            sessions.by_key.values().map(StreamSession::snapshot).collect();
        snapshot.into_iter()
    }

    /// Get total number of sessions
    pub async fn len(&self) -> usize {
        self.sessions.read().await.by_key.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Remove every session, e.g. at shutdown
    pub async fn drain(&self) -> Vec<StreamSession> {
        let mut sessions = self.sessions.write().await;

        let keys: Vec<StreamKey> = sessions.by_key.keys().cloned().collect();
        let drained: Vec<StreamSession> = keys
            .iter()
            .filter_map(|key| sessions.remove(key, None, &self.events))
            .collect();

        if !drained.is_empty() {
            tracing::info!(count = drained.len(), "Registry drained");
        }
        drained
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::stream::DEFAULT_LIVE_APP;

    fn key(station: &str) -> StreamKey {
        StreamKey::parse(&format!("/live/{}", station), DEFAULT_LIVE_APP).unwrap()
    }

    fn conn(id: u64) -> ConnectionId {
        ConnectionId::new(id)
    }

    #[tokio::test]
    async fn test_empty_on_start() {
        let registry = SessionRegistry::new(EventBus::new());
        assert!(registry.is_empty().await);
        assert_eq!(registry.list().await.count(), 0);
    }

    #[tokio::test]
    async fn test_commit_and_get() {
        let registry = SessionRegistry::new(EventBus::new());
        let meta = PublishMetadata::new().with("audiodatarate", 128u32);

        let handle = registry.commit(key("s1"), conn(1), meta.clone()).await.unwrap();
        assert_eq!(handle.key, key("s1"));

        let snapshot = registry.get(&key("s1")).await.unwrap();
        assert_eq!(snapshot.connection_id, conn(1));
        assert_eq!(snapshot.session_id, handle.session_id);
        assert_eq!(snapshot.phase, StreamPhase::Publishing);
        assert_eq!(snapshot.metadata, meta);
        assert!(snapshot.pipeline_pid.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_commit() {
        let registry = SessionRegistry::new(EventBus::new());

        registry.commit(key("s1"), conn(1), PublishMetadata::new()).await.unwrap();
        let result = registry.commit(key("s1"), conn(2), PublishMetadata::new()).await;

        assert!(matches!(result, Err(RegistryError::AlreadyExists(k)) if k == key("s1")));
        assert_eq!(registry.len().await, 1);
        assert_eq!(registry.get(&key("s1")).await.unwrap().connection_id, conn(1));
    }

    #[tokio::test]
    async fn test_connection_busy() {
        let registry = SessionRegistry::new(EventBus::new());

        registry.commit(key("s1"), conn(1), PublishMetadata::new()).await.unwrap();
        let result = registry.commit(key("s2"), conn(1), PublishMetadata::new()).await;

        assert!(matches!(result, Err(RegistryError::ConnectionBusy(c)) if c == conn(1)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_commits_single_winner() {
        let registry = Arc::new(SessionRegistry::new(EventBus::new()));

        let tasks: Vec<_> = (0..32)
            .map(|i| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move {
                    registry
                        .commit(key("contested"), conn(i), PublishMetadata::new())
                        .await
                })
            })
            .collect();

        let mut wins = 0;
        let mut losses = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => wins += 1,
                Err(RegistryError::AlreadyExists(_)) => losses += 1,
                Err(e) => panic!("unexpected error: {}", e),
            }
        }

        assert_eq!(wins, 1);
        assert_eq!(losses, 31);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_release_idempotent() {
        let bus = EventBus::new();
        let mut events = bus.subscribe();
        let registry = SessionRegistry::new(bus);

        registry.commit(key("s1"), conn(1), PublishMetadata::new()).await.unwrap();

        let first = registry.release(&key("s1")).await;
        assert_eq!(first.unwrap().phase, StreamPhase::Stopped);
        assert!(registry.release(&key("s1")).await.is_none());
        assert!(registry.is_empty().await);

        let stopped: Vec<_> = events
            .drain()
            .into_iter()
            .filter(|e| e.kind == EventKind::Stopped)
            .collect();
        assert_eq!(stopped.len(), 1);
    }

    #[tokio::test]
    async fn test_release_connection() {
        let registry = SessionRegistry::new(EventBus::new());

        registry.commit(key("s1"), conn(1), PublishMetadata::new()).await.unwrap();
        registry.commit(key("s2"), conn(2), PublishMetadata::new()).await.unwrap();
        assert_eq!(registry.key_for_connection(conn(2)).await, Some(key("s2")));

        let released = registry.release_connection(conn(1)).await.unwrap();
        assert_eq!(released.key, key("s1"));
        assert!(registry.release_connection(conn(1)).await.is_none());
        assert!(registry.contains(&key("s2")).await);

        // Connection id is free again once released
        registry.commit(key("s3"), conn(1), PublishMetadata::new()).await.unwrap();
    }

    #[tokio::test]
    async fn test_release_stale_session_is_noop() {
        let registry = SessionRegistry::new(EventBus::new());

        let old = registry.commit(key("s1"), conn(1), PublishMetadata::new()).await.unwrap();
        registry.release(&key("s1")).await.unwrap();
        let new = registry.commit(key("s1"), conn(2), PublishMetadata::new()).await.unwrap();
        assert_ne!(old.session_id, new.session_id);

        assert!(registry.release_session(&old).await.is_none());
        assert!(registry.release_crashed(&key("s1"), old.session_id, Some(1)).await.is_none());
        assert_eq!(registry.get(&key("s1")).await.unwrap().connection_id, conn(2));
    }

    #[tokio::test]
    async fn test_release_crashed_event_order() {
        let bus = EventBus::new();
        let mut events = bus.subscribe().for_key(key("s1"));
        let registry = SessionRegistry::new(bus);

        let handle = registry.commit(key("s1"), conn(1), PublishMetadata::new()).await.unwrap();
        registry
            .release_crashed(&key("s1"), handle.session_id, Some(137))
            .await
            .unwrap();

        let kinds: Vec<_> = events.drain().into_iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            [EventKind::PipelineCrashed { code: Some(137) }, EventKind::Stopped]
        );
    }

    #[tokio::test]
    async fn test_list_is_point_in_time() {
        let registry = SessionRegistry::new(EventBus::new());

        registry.commit(key("s1"), conn(1), PublishMetadata::new()).await.unwrap();
        registry.commit(key("s2"), conn(2), PublishMetadata::new()).await.unwrap();

        let snapshot = registry.list().await;
        registry.release(&key("s1")).await;

        // Earlier snapshot is unaffected; a new call sees the change
        assert_eq!(snapshot.count(), 2);
        let keys: Vec<_> = registry.list().await.map(|s| s.key).collect();
        assert_eq!(keys, [key("s2")]);
    }

    #[tokio::test]
    async fn test_drain() {
        let bus = EventBus::new();
        let mut events = bus.subscribe();
        let registry = SessionRegistry::new(bus);

        for i in 0..3 {
            registry
                .commit(key(&format!("s{}", i)), conn(i), PublishMetadata::new())
                .await
                .unwrap();
        }

        let drained = registry.drain().await;
        assert_eq!(drained.len(), 3);
        assert!(registry.is_empty().await);
        assert_eq!(
            events.drain().iter().filter(|e| e.kind == EventKind::Stopped).count(),
            3
        );
    }
}
