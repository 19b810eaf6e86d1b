//! Transport-facing ingest server
//!
//! The RTMP transport itself (handshake, chunking, GOP cache) lives outside
//! this crate. It calls into [`IngestServer`] at three points of a publish:
//!
//! ```text
//! prePublish   ──► on_publish_attempt ──► Decision (Reject = close connection)
//! postPublish  ──► on_publish_started ──► commit, start transcoder, Live
//! donePublish  ──► on_publish_done    ─┐
//! disconnect   ──► on_connection_closed┴► release + stop, exactly once
//! ```

pub mod config;
pub mod gate;
pub mod ingest;
pub mod report;
pub mod stats;

pub use config::{HttpConfig, IngestConfig, RtmpConfig};
pub use gate::{Decision, PublishGate, RejectReason};
pub use ingest::IngestServer;
pub use report::{AudioFormat, StationReport};
pub use stats::ServerStats;
