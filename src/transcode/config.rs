//! Transcoder configuration

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Parameters for the per-stream transcoder
///
/// Defaults reproduce the audio HLS preset the ingest server has always
/// shipped with: AAC-LC at 320 kbps, 48 kHz stereo, 2 s segments, 3 kept.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TranscodeConfig {
    /// Path to the transcoder executable (ffmpeg)
    pub transcoder_executable_path: PathBuf,

    /// Target duration of each HLS segment
    pub segment_duration_seconds: u32,

    /// Segments kept in the playlist; older ones are deleted
    pub segment_retention_count: u32,

    /// Delete segments that fall out of the playlist
    pub hls_delete_segments: bool,

    /// Output audio codec
    pub audio_codec: String,

    /// Output audio profile
    pub audio_profile: String,

    pub audio_bitrate_kbps: u32,

    pub audio_channels: u8,

    pub audio_sample_rate_hz: u32,

    /// Upper bound on launching the transcoder
    pub spawn_timeout_millis: u64,

    /// Grace period between the termination signal and a forced kill
    pub stop_timeout_millis: u64,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            transcoder_executable_path: PathBuf::from("/usr/local/bin/ffmpeg"),
            segment_duration_seconds: 2,
            segment_retention_count: 3,
            hls_delete_segments: true,
            audio_codec: "aac".to_string(),
            audio_profile: "aac_low".to_string(),
            audio_bitrate_kbps: 320,
            audio_channels: 2,
            audio_sample_rate_hz: 48_000,
            spawn_timeout_millis: 5_000,
            stop_timeout_millis: 3_000,
        }
    }
}

impl TranscodeConfig {
    pub fn spawn_timeout(&self) -> Duration {
        Duration::from_millis(self.spawn_timeout_millis)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_millis)
    }

    /// Set the transcoder executable
    pub fn executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.transcoder_executable_path = path.into();
        self
    }

    /// Set segment duration and retention
    pub fn segments(mut self, duration_secs: u32, retention: u32) -> Self {
        self.segment_duration_seconds = duration_secs;
        self.segment_retention_count = retention;
        self
    }

    /// Set output audio format
    pub fn audio(mut self, bitrate_kbps: u32, channels: u8, sample_rate_hz: u32) -> Self {
        self.audio_bitrate_kbps = bitrate_kbps;
        self.audio_channels = channels;
        self.audio_sample_rate_hz = sample_rate_hz;
        self
    }

    /// Set spawn timeout
    pub fn spawn_timeout_ms(mut self, millis: u64) -> Self {
        self.spawn_timeout_millis = millis;
        self
    }

    /// Set stop timeout
    pub fn stop_timeout_ms(mut self, millis: u64) -> Self {
        self.stop_timeout_millis = millis;
        self
    }

    /// Check the values make sense, returning a description of the first problem
    pub fn validate(&self) -> Result<(), String> {
        if self.transcoder_executable_path.as_os_str().is_empty() {
            return Err("transcoderExecutablePath must not be empty".into());
        }
        if self.segment_duration_seconds == 0 {
            return Err("segmentDurationSeconds must be positive".into());
        }
        if self.segment_retention_count == 0 {
            return Err("segmentRetentionCount must be positive".into());
        }
        if self.audio_bitrate_kbps == 0 {
            return Err("audioBitrateKbps must be positive".into());
        }
        if !(1..=8).contains(&self.audio_channels) {
            return Err(format!("audioChannels must be 1..=8, got {}", self.audio_channels));
        }
        if self.audio_sample_rate_hz == 0 {
            return Err("audioSampleRateHz must be positive".into());
        }
        if self.spawn_timeout_millis == 0 || self.stop_timeout_millis == 0 {
            return Err("spawnTimeoutMillis and stopTimeoutMillis must be positive".into());
        }
        Ok(())
    }
}
