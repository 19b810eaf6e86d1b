//! Publish gate
//!
//! First stop for every publish handshake. Decides accept or reject before any
//! media is taken; it never inserts into the registry itself.

use std::fmt;
use std::sync::Arc;

use crate::events::{EventBus, EventKind};
use crate::registry::SessionRegistry;
use crate::stream::{ConnectionId, PublishMetadata, StreamKey};

/// Why a publish was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    /// Path is not `/<live app>/<station>`
    MalformedPath,
    /// Someone is already publishing this station
    DuplicateStream,
    /// The transcoder could not be started
    SpawnFailed,
    /// The session went away while it was being set up
    Aborted,
}

impl RejectReason {
    pub fn as_str(self) -> &'static str {
        match self {
            RejectReason::MalformedPath => "malformed-path",
            RejectReason::DuplicateStream => "duplicate-stream",
            RejectReason::SpawnFailed => "spawn-failed",
            RejectReason::Aborted => "aborted",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a publish attempt
///
/// A `Reject` obliges the transport to terminate the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Accept(StreamKey),
    Reject(RejectReason),
}

impl Decision {
    pub fn is_accept(&self) -> bool {
        matches!(self, Decision::Accept(_))
    }

    pub fn is_reject(&self) -> bool {
        matches!(self, Decision::Reject(_))
    }

    /// Key to hand to `on_publish_started`, if accepted
    pub fn accepted_key(&self) -> Option<&StreamKey> {
        match self {
            Decision::Accept(key) => Some(key),
            Decision::Reject(_) => None,
        }
    }

    pub fn reject_reason(&self) -> Option<RejectReason> {
        match self {
            Decision::Accept(_) => None,
            Decision::Reject(reason) => Some(*reason),
        }
    }
}

/// Validates publish paths and enforces one publisher per station
///
/// The duplicate check here is advisory: two handshakes can both pass it, and
/// `SessionRegistry::commit` settles the race.
pub struct PublishGate {
    live_app: String,
    registry: Arc<SessionRegistry>,
    events: EventBus,
}

impl PublishGate {
    pub fn new(live_app: impl Into<String>, registry: Arc<SessionRegistry>) -> Self {
        let events = registry.events().clone();
        Self {
            live_app: live_app.into(),
            registry,
            events,
        }
    }

    /// Application name publishes must use
    pub fn live_app(&self) -> &str {
        &self.live_app
    }

    /// Decide whether `raw_path` may be published by `connection_id`
    pub async fn evaluate(
        &self,
        connection_id: ConnectionId,
        raw_path: &str,
        metadata: &PublishMetadata,
    ) -> Decision {
        let key = match StreamKey::parse(raw_path, &self.live_app) {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!(
                    connection_id = %connection_id,
                    path = %raw_path,
                    error = %e,
                    "Publish rejected"
                );
                self.events.emit_unkeyed(
                    connection_id,
                    raw_path,
                    EventKind::PublishRejected {
                        reason: RejectReason::MalformedPath.to_string(),
                    },
                );
                return Decision::Reject(RejectReason::MalformedPath);
            }
        };

        if self.registry.contains(&key).await {
            tracing::warn!(
                stream = %key,
                connection_id = %connection_id,
                "Publish rejected, stream already live"
            );
            self.events.emit(
                connection_id,
                &key,
                EventKind::PublishRejected {
                    reason: RejectReason::DuplicateStream.to_string(),
                },
            );
            return Decision::Reject(RejectReason::DuplicateStream);
        }

        tracing::info!(
            stream = %key,
            connection_id = %connection_id,
            metadata_fields = metadata.len(),
            "prePublish"
        );
        self.events.emit(connection_id, &key, EventKind::PrePublish);

        Decision::Accept(key)
    }
}
