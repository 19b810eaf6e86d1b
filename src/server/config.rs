//! Server configuration

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::stream::DEFAULT_LIVE_APP;
use crate::transcode::TranscodeConfig;

/// RTMP endpoint settings
///
/// The transport owns the listener; the ingest core only needs the port to
/// point transcoders back at it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RtmpConfig {
    /// Port the RTMP transport listens on
    pub port: u16,

    /// Chunk size negotiated with clients
    pub chunk_size: u32,

    /// Keep the last GOP for late joiners
    pub gop_cache: bool,

    /// Ping interval in seconds
    pub ping_secs: u64,

    /// Disconnect after this many seconds without a ping response
    pub ping_timeout_secs: u64,
}

impl Default for RtmpConfig {
    fn default() -> Self {
        Self {
            port: 1935,
            chunk_size: 60_000,
            gop_cache: true,
            ping_secs: 30,
            ping_timeout_secs: 60,
        }
    }
}

/// HTTP delivery settings
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HttpConfig {
    pub port: u16,

    /// Value of the `Access-Control-Allow-Origin` header
    pub allow_origin: String,

    /// Root directory HLS output is written under and served from
    pub media_root: PathBuf,

    /// Expose the status API
    pub api: bool,

    /// Serve HTTP-FLV
    pub flv: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: 3001,
            allow_origin: "*".to_string(),
            media_root: PathBuf::from("./"),
            api: true,
            flv: true,
        }
    }
}

/// Ingest server configuration
///
/// Every field has a default, so an empty JSON object is a valid config.
/// Transcoder options sit at the top level next to `liveApplicationName`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IngestConfig {
    /// Only publishes under this application are accepted
    pub live_application_name: String,

    #[serde(flatten)]
    pub transcode: TranscodeConfig,

    pub rtmp: RtmpConfig,

    pub http: HttpConfig,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            live_application_name: DEFAULT_LIVE_APP.to_string(),
            transcode: TranscodeConfig::default(),
            rtmp: RtmpConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

impl IngestConfig {
    /// Parse a JSON document
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))
    }

    /// Read and parse a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Set the accepted application name
    pub fn live_application(mut self, name: impl Into<String>) -> Self {
        self.live_application_name = name.into();
        self
    }

    /// Replace the transcoder settings
    pub fn transcode(mut self, transcode: TranscodeConfig) -> Self {
        self.transcode = transcode;
        self
    }

    /// Set the transcoder executable
    pub fn transcoder(mut self, path: impl Into<PathBuf>) -> Self {
        self.transcode.transcoder_executable_path = path.into();
        self
    }

    /// Set the RTMP port transcoders pull from
    pub fn rtmp_port(mut self, port: u16) -> Self {
        self.rtmp.port = port;
        self
    }

    /// Set the HLS output root
    pub fn media_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.http.media_root = path.into();
        self
    }

    /// Local RTMP endpoint transcoders read from
    pub fn input_base(&self) -> String {
        format!("rtmp://127.0.0.1:{}", self.rtmp.port)
    }

    pub fn validate(&self) -> Result<()> {
        let app = &self.live_application_name;
        if app.is_empty() || app.contains(|c: char| c == '/' || c == '\\') {
            return Err(Error::Config(format!(
                "liveApplicationName must be a single non-empty segment, got '{}'",
                app
            )));
        }
        if self.rtmp.port == 0 {
            return Err(Error::Config("rtmp.port must be non-zero".into()));
        }
        if self.http.media_root.as_os_str().is_empty() {
            return Err(Error::Config("http.mediaRoot must not be empty".into()));
        }
        self.transcode.validate().map_err(Error::Config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = IngestConfig::default();

        assert_eq!(config.live_application_name, "live");
        assert_eq!(config.rtmp.port, 1935);
        assert_eq!(config.rtmp.chunk_size, 60_000);
        assert!(config.rtmp.gop_cache);
        assert_eq!(config.http.port, 3001);
        assert_eq!(config.http.allow_origin, "*");
        assert_eq!(config.input_base(), "rtmp://127.0.0.1:1935");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_json_is_default() {
        let config = IngestConfig::from_json_str("{}").unwrap();
        assert_eq!(config, IngestConfig::default());
    }

    #[test]
    fn test_json_options() {
        let config = IngestConfig::from_json_str(
            r#"{
                "liveApplicationName": "radio",
                "segmentDurationSeconds": 4,
                "segmentRetentionCount": 5,
                "audioBitrateKbps": 128,
                "audioChannels": 1,
                "audioSampleRateHz": 44100,
                "transcoderExecutablePath": "/usr/bin/ffmpeg",
                "spawnTimeoutMillis": 1000,
                "stopTimeoutMillis": 500,
                "rtmp": { "port": 1936 },
                "http": { "mediaRoot": "/var/media" }
            }"#,
        )
        .unwrap();

        assert_eq!(config.live_application_name, "radio");
        assert_eq!(config.transcode.segment_duration_seconds, 4);
        assert_eq!(config.transcode.segment_retention_count, 5);
        assert_eq!(config.transcode.audio_bitrate_kbps, 128);
        assert_eq!(config.transcode.audio_channels, 1);
        assert_eq!(config.transcode.audio_sample_rate_hz, 44_100);
        assert_eq!(config.transcode.transcoder_executable_path, PathBuf::from("/usr/bin/ffmpeg"));
        assert_eq!(config.transcode.spawn_timeout_millis, 1000);
        assert_eq!(config.transcode.stop_timeout_millis, 500);
        assert_eq!(config.rtmp.port, 1936);
        // Unspecified nested fields keep their defaults
        assert_eq!(config.rtmp.ping_secs, 30);
        assert_eq!(config.http.media_root, PathBuf::from("/var/media"));
        assert_eq!(config.http.port, 3001);
    }

    #[test]
    fn test_malformed_json() {
        let err = IngestConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = IngestConfig::from_json_str(r#"{"audioChannels": "two"}"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"liveApplicationName": "studio"}}"#).unwrap();

        let config = IngestConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.live_application_name, "studio");

        let err = IngestConfig::from_json_file("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_builders() {
        let config = IngestConfig::default()
            .live_application("radio")
            .transcoder("/opt/ffmpeg")
            .rtmp_port(1940)
            .media_root("/tmp/hls");

        assert_eq!(config.live_application_name, "radio");
        assert_eq!(config.transcode.transcoder_executable_path, PathBuf::from("/opt/ffmpeg"));
        assert_eq!(config.input_base(), "rtmp://127.0.0.1:1940");
        assert_eq!(config.http.media_root, PathBuf::from("/tmp/hls"));
    }

    #[test]
    fn test_validate() {
        assert!(IngestConfig::default().live_application("").validate().is_err());
        assert!(IngestConfig::default().live_application("a/b").validate().is_err());
        assert!(IngestConfig::default().rtmp_port(0).validate().is_err());
        assert!(IngestConfig::default()
            .transcode(TranscodeConfig::default().segments(0, 3))
            .validate()
            .is_err());
    }
}
