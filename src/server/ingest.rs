//! Ingest server
//!
//! Transport-facing surface of the crate. An RTMP transport forwards its
//! publish callbacks here; the server drives the gate, the registry and the
//! transcoder supervisor and reports what is live.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::events::{EventBus, EventKind, EventSubscription};
use crate::registry::{Detached, SessionHandle, SessionRegistry};
use crate::stream::{ConnectionId, PublishMetadata, StreamKey};
use crate::transcode::{PipelineExit, PipelineHandle, TranscodeSupervisor};

use super::config::IngestConfig;
use super::gate::{Decision, PublishGate};
use super::report::{AudioFormat, StationReport};
use super::stats::{Counters, ServerStats};

/// Live-stream ingest server
///
/// Owns every component for the lifetime of the process: the registry is
/// created empty here and drained by [`shutdown`](Self::shutdown).
pub struct IngestServer {
    config: IngestConfig,
    events: EventBus,
    registry: Arc<SessionRegistry>,
    gate: PublishGate,
    supervisor: Arc<TranscodeSupervisor>,
    counters: Counters,
}

impl IngestServer {
    /// Create a server from a validated configuration
    pub fn new(config: IngestConfig) -> Result<Self> {
        config.validate()?;

        let events = EventBus::new();
        let registry = Arc::new(SessionRegistry::new(events.clone()));
        let gate = PublishGate::new(config.live_application_name.clone(), registry.clone());
        let supervisor = Arc::new(TranscodeSupervisor::new(
            config.transcode.clone(),
            config.input_base(),
            config.http.media_root.clone(),
            &registry,
        ));

        tracing::info!(
            app = %config.live_application_name,
            transcoder = %config.transcode.transcoder_executable_path.display(),
            media_root = %config.http.media_root.display(),
            rtmp_port = config.rtmp.port,
            "Ingest server ready"
        );

        Ok(Self {
            config,
            events,
            registry,
            gate,
            supervisor,
            counters: Counters::new(),
        })
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn supervisor(&self) -> &Arc<TranscodeSupervisor> {
        &self.supervisor
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> EventSubscription {
        self.events.subscribe()
    }

    /// prePublish: decide whether the handshake may continue
    ///
    /// A `Reject` must be answered by closing the connection.
    pub async fn on_publish_attempt(
        &self,
        connection_id: ConnectionId,
        path: &str,
        metadata: &PublishMetadata,
    ) -> Decision {
        self.counters.publish_attempt();

        let decision = self.gate.evaluate(connection_id, path, metadata).await;
        if decision.is_reject() {
            self.counters.rejected();
        }
        decision
    }

    /// postPublish: commit the session, start its transcoder, mark it live
    ///
    /// On error nothing is left in the registry and the transport must close
    /// the connection.
    pub async fn on_publish_started(
        &self,
        connection_id: ConnectionId,
        key: &StreamKey,
        metadata: PublishMetadata,
    ) -> Result<SessionHandle> {
        let session = match self.registry.commit(key.clone(), connection_id, metadata).await {
            Ok(session) => session,
            Err(e) => return Err(self.publish_failed(connection_id, key, e.into())),
        };

        let pipeline = match self.supervisor.start(&session).await {
            Ok(pipeline) => pipeline,
            Err(e) => {
                tracing::error!(
                    stream = %key,
                    connection_id = %connection_id,
                    error = %e,
                    "Transcoder failed to start"
                );
                self.counters.spawn_failed();
                self.registry.release_session(&session).await;
                return Err(self.publish_failed(connection_id, key, e.into()));
            }
        };

        if let Err(Detached { error, pipeline }) =
            self.registry.attach_pipeline(&session, pipeline).await
        {
            tracing::warn!(
                stream = %key,
                connection_id = %connection_id,
                error = %error,
                "Session ended during setup"
            );
            self.spawn_stop(pipeline);
            return Err(self.publish_failed(connection_id, key, error.into()));
        }

        self.counters.session_started();
        Ok(session)
    }

    /// donePublish: the publisher finished cleanly
    ///
    /// Returns `false` if the connection had no session (already released).
    pub async fn on_publish_done(&self, connection_id: ConnectionId) -> bool {
        tracing::info!(connection_id = %connection_id, "donePublish");
        self.release_connection(connection_id).await
    }

    /// The transport dropped the connection
    ///
    /// Releases and stops at most once, however often this races with
    /// `on_publish_done` or a pipeline crash.
    pub async fn on_connection_closed(&self, connection_id: ConnectionId) -> bool {
        tracing::debug!(connection_id = %connection_id, "Connection closed");
        self.release_connection(connection_id).await
    }

    /// Live stations, sorted by station id
    pub async fn list_active_stations(&self) -> Vec<StationReport> {
        let format = AudioFormat::from_config(&self.config.transcode);

        let mut stations: Vec<StationReport> = self
            .registry
            .list()
            .await
            .filter(|snapshot| snapshot.is_live())
            .map(|snapshot| StationReport::from_snapshot(&snapshot, format.clone()))
            .collect();
        stations.sort_by(|a, b| a.station.cmp(&b.station));
        stations
    }

    pub async fn stats(&self) -> ServerStats {
        self.counters.snapshot(self.registry.len().await)
    }

    /// Release every session and wait for all transcoders to stop
    pub async fn shutdown(&self) {
        let sessions = self.registry.drain().await;
        tracing::info!(sessions = sessions.len(), "Shutting down ingest server");

        let stops: Vec<JoinHandle<PipelineExit>> = sessions
            .into_iter()
            .filter_map(|mut session| session.take_pipeline())
            .map(|pipeline| self.spawn_stop(pipeline))
            .collect();

        for stop in stops {
            if let Err(e) = stop.await {
                tracing::error!(error = %e, "Transcoder teardown task failed");
            }
        }
    }

    async fn release_connection(&self, connection_id: ConnectionId) -> bool {
        let Some(mut session) = self.registry.release_connection(connection_id).await else {
            return false;
        };

        if let Some(pipeline) = session.take_pipeline() {
            self.spawn_stop(pipeline);
        }
        true
    }

    /// Stop a pipeline on a teardown task, off the connection path
    fn spawn_stop(&self, pipeline: PipelineHandle) -> JoinHandle<PipelineExit> {
        let supervisor = self.supervisor.clone();
        tokio::spawn(async move { supervisor.stop(&pipeline).await })
    }

    fn publish_failed(&self, connection_id: ConnectionId, key: &StreamKey, error: Error) -> Error {
        self.counters.rejected();
        if let Some(reason) = error.reject_reason() {
            self.events.emit(
                connection_id,
                key,
                EventKind::PublishRejected {
                    reason: reason.to_string(),
                },
            );
        }
        error
    }
}
