//! Live-stream ingest core
//!
//! Accepts publish requests from a transport layer, validates stream identity,
//! keeps an authoritative registry of what is live and supervises one external
//! transcoder per accepted stream.
//!
//! ```text
//!  transport ──► IngestServer::on_publish_attempt ──► PublishGate ──► Decision
//!      │                                                  │
//!      └──► on_publish_started ──► SessionRegistry::commit
//!                                    │
//!                                    ├─► TranscodeSupervisor::start ──► ffmpeg (HLS)
//!                                    └─► attach_pipeline ──► Live
//!
//!  disconnect / donePublish / crash ──► release ──► stop ──► EventBus: Stopped
//! ```
//!
//! # Example
//! ```no_run
//! use live_ingest::{ConnectionId, IngestConfig, IngestServer, PublishMetadata};
//!
//! # async fn example() -> live_ingest::Result<()> {
//! let server = IngestServer::new(IngestConfig::default())?;
//! let conn = ConnectionId::new(1);
//!
//! let decision = server
//!     .on_publish_attempt(conn, "/live/station1", &PublishMetadata::new())
//!     .await;
//! if let Some(key) = decision.accepted_key() {
//!     server.on_publish_started(conn, key, PublishMetadata::new()).await?;
//! }
//!
//! for station in server.list_active_stations().await {
//!     println!("{} up for {}ms", station.station, station.uptime_millis);
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod events;
pub mod registry;
pub mod server;
pub mod stream;
pub mod transcode;

pub use error::{Error, Result};
pub use events::{EventBus, EventKind, EventSubscription, LifecycleEvent};
pub use registry::{SessionHandle, SessionRegistry, SessionSnapshot, StreamSession};
pub use server::{
    AudioFormat, Decision, IngestConfig, IngestServer, PublishGate, RejectReason, ServerStats,
    StationReport,
};
pub use stream::{ConnectionId, InvalidPath, MetadataValue, PublishMetadata, StreamKey, StreamPhase};
pub use transcode::{
    PipelineExit, PipelineHandle, SpawnError, TranscodeConfig, TranscodeSupervisor,
};
