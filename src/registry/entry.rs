//! Session entry and snapshot types
//!
//! This module defines the per-stream state stored in the registry.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::stream::{ConnectionId, PublishMetadata, StreamKey, StreamPhase};
use crate::transcode::PipelineHandle;

/// Ticket returned by a successful commit
///
/// Identifies one committed session. The `session_id` distinguishes it from
/// any later session under the same key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    pub key: StreamKey,
    pub connection_id: ConnectionId,
    pub session_id: u64,
}

/// One active publish, owned by the registry
pub struct StreamSession {
    /// Stream identity
    pub key: StreamKey,

    /// Publishing connection
    pub connection_id: ConnectionId,

    /// Registry-assigned id, unique for the process lifetime
    pub session_id: u64,

    /// When the session was committed
    pub started_at: Instant,

    /// Wall-clock commit time, for reporting
    pub started_at_wall: SystemTime,

    /// Codec/bitrate hints supplied by the publisher
    pub metadata: PublishMetadata,

    /// Current lifecycle phase
    pub phase: StreamPhase,

    /// Running transcoder, exclusively owned
    pub(super) pipeline: Option<PipelineHandle>,
}

impl StreamSession {
    pub(super) fn new(
        key: StreamKey,
        connection_id: ConnectionId,
        session_id: u64,
        metadata: PublishMetadata,
    ) -> Self {
        Self {
            key,
            connection_id,
            session_id,
            started_at: Instant::now(),
            started_at_wall: SystemTime::now(),
            metadata,
            phase: StreamPhase::Idle,
            pipeline: None,
        }
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            key: self.key.clone(),
            connection_id: self.connection_id,
            session_id: self.session_id,
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn pipeline(&self) -> Option<&PipelineHandle> {
        self.pipeline.as_ref()
    }

    /// Take ownership of the pipeline, e.g. to stop it after release
    pub fn take_pipeline(&mut self) -> Option<PipelineHandle> {
        self.pipeline.take()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            key: self.key.clone(),
            connection_id: self.connection_id,
            session_id: self.session_id,
            started_at: self.started_at,
            started_at_unix_ms: self
                .started_at_wall
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0),
            metadata: self.metadata.clone(),
            phase: self.phase,
            pipeline_pid: self.pipeline.as_ref().and_then(PipelineHandle::pid),
        }
    }
}

impl std::fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSession")
            .field("key", &self.key)
            .field("connection_id", &self.connection_id)
            .field("session_id", &self.session_id)
            .field("phase", &self.phase)
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}

/// Point-in-time view of a session, without the pipeline
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub key: StreamKey,
    pub connection_id: ConnectionId,
    pub session_id: u64,
    pub started_at: Instant,
    pub started_at_unix_ms: u64,
    pub metadata: PublishMetadata,
    pub phase: StreamPhase,
    /// OS process id of the transcoder, once attached
    pub pipeline_pid: Option<u32>,
}

impl SessionSnapshot {
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn is_live(&self) -> bool {
        self.phase.is_live()
    }
}
