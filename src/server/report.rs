//! Active station reporting

use serde::Serialize;

use crate::registry::SessionSnapshot;
use crate::transcode::TranscodeConfig;

/// Output format of a station's HLS rendition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioFormat {
    pub codec: String,
    /// e.g. `"320k"`
    pub bitrate: String,
    /// e.g. `"48kHz"`, `"44.1kHz"`
    pub sample_rate: String,
    pub channels: u8,
}

impl AudioFormat {
    /// Format the transcoder is configured to produce
    pub fn from_config(config: &TranscodeConfig) -> Self {
        Self {
            codec: config.audio_codec.clone(),
            bitrate: format!("{}k", config.audio_bitrate_kbps),
            sample_rate: format!("{}kHz", f64::from(config.audio_sample_rate_hz) / 1000.0),
            channels: config.audio_channels,
        }
    }
}

/// One live station, as exposed to the status API
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StationReport {
    pub station: String,
    pub uptime_millis: u64,
    pub stream_path: String,
    #[serde(rename = "type")]
    pub media_type: &'static str,
    /// Milliseconds since Unix epoch
    pub started_at: u64,
    pub format: AudioFormat,
}

impl StationReport {
    pub fn from_snapshot(snapshot: &SessionSnapshot, format: AudioFormat) -> Self {
        Self {
            station: snapshot.key.station_id().to_string(),
            uptime_millis: snapshot.uptime().as_millis() as u64,
            stream_path: snapshot.key.stream_path(),
            media_type: "audio",
            started_at: snapshot.started_at_unix_ms,
            format,
        }
    }
}
