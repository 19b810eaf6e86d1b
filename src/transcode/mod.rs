//! Per-stream transcoder supervision
//!
//! Each live session owns exactly one external transcoder (ffmpeg) that pulls
//! the published stream back from the local RTMP endpoint and writes an audio
//! HLS playlist:
//!
//! ```text
//! <mediaRoot>/<application>/<station>/index.m3u8
//! ```
//!
//! - [`TranscodeConfig`]: executable, segment and audio parameters, timeouts
//! - [`TranscodeCommand`]: the resolved command line for one stream
//! - [`TranscodeSupervisor`]: start, monitor, stop
//! - [`PipelineHandle`]: exclusive ownership of one running transcoder

pub mod command;
pub mod config;
pub mod error;
pub mod handle;
pub mod supervisor;

pub use command::{TranscodeCommand, PLAYLIST_NAME};
pub use config::TranscodeConfig;
pub use error::SpawnError;
pub use handle::{PipelineExit, PipelineHandle};
pub use supervisor::TranscodeSupervisor;
