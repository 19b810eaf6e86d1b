//! Lifecycle event types

use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::stream::{ConnectionId, StreamKey};

/// What happened to a stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EventKind {
    /// Publish request accepted by the gate
    PrePublish,
    /// Transcoder running, stream is live
    Published,
    /// Transcoder exited without being asked to
    PipelineCrashed {
        /// Exit code, if the process exited rather than being signalled
        code: Option<i32>,
    },
    /// Session released
    Stopped,
    /// Publish request refused
    PublishRejected {
        reason: String,
    },
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::PrePublish => "prePublish",
            EventKind::Published => "published",
            EventKind::PipelineCrashed { .. } => "pipelineCrashed",
            EventKind::Stopped => "stopped",
            EventKind::PublishRejected { .. } => "publishRejected",
        }
    }
}

/// A lifecycle notification
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleEvent {
    /// Bus-wide sequence number, increasing in emission order
    pub seq: u64,
    /// Stream key, absent when the publish path never parsed
    pub key: Option<StreamKey>,
    /// Stream path as requested by the publisher
    pub stream_path: String,
    pub connection_id: ConnectionId,
    #[serde(flatten)]
    pub kind: EventKind,
    /// Milliseconds since Unix epoch
    pub at: u64,
}

impl LifecycleEvent {
    /// Whether this event concerns `key`
    pub fn is_for(&self, key: &StreamKey) -> bool {
        self.key.as_ref() == Some(key)
    }
}

/// Get current timestamp in milliseconds since Unix epoch
pub(crate) fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
