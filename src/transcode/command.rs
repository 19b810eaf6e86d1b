//! Transcoder command line
//!
//! Builds the ffmpeg invocation that pulls a published stream back from the
//! local RTMP endpoint and writes a rolling audio HLS playlist.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use crate::stream::StreamKey;

use super::config::TranscodeConfig;

/// Name of the playlist written in each stream's output directory
pub const PLAYLIST_NAME: &str = "index.m3u8";

/// A fully resolved transcoder invocation for one stream
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeCommand {
    program: PathBuf,
    args: Vec<String>,
    input_url: String,
    output_dir: PathBuf,
}

impl TranscodeCommand {
    /// Resolve the invocation for `key`
    ///
    /// `input_base` is the local RTMP endpoint, e.g. `rtmp://127.0.0.1:1935`.
    /// Output lands in `<media_root>/<application>/<station>/index.m3u8`.
    pub fn build(config: &TranscodeConfig, input_base: &str, media_root: &Path, key: &StreamKey) -> Self {
        let input_url = format!("{}{}", input_base.trim_end_matches('/'), key.stream_path());
        let output_dir = media_root.join(key.application()).join(key.station_id());
        let playlist = output_dir.join(PLAYLIST_NAME);

        let mut args: Vec<String> = vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "warning".into(),
            "-y".into(),
            "-i".into(),
            input_url.clone(),
            // Audio-only preset
            "-vn".into(),
            "-c:a".into(),
            config.audio_codec.clone(),
            "-b:a".into(),
            format!("{}k", config.audio_bitrate_kbps),
            "-ar".into(),
            config.audio_sample_rate_hz.to_string(),
            "-ac".into(),
            config.audio_channels.to_string(),
            "-af".into(),
            "aresample=async=1000".into(),
        ];

        if !config.audio_profile.is_empty() {
            args.push("-profile:a".into());
            args.push(config.audio_profile.clone());
        }

        args.extend([
            "-f".into(),
            "hls".into(),
            "-hls_time".into(),
            config.segment_duration_seconds.to_string(),
            "-hls_list_size".into(),
            config.segment_retention_count.to_string(),
        ]);
        if config.hls_delete_segments {
            args.push("-hls_flags".into());
            args.push("delete_segments".into());
        }
        args.push(playlist.to_string_lossy().into_owned());

        Self {
            program: config.transcoder_executable_path.clone(),
            args,
            input_url,
            output_dir,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn input_url(&self) -> &str {
        &self.input_url
    }

    /// Directory the playlist and segments are written to
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn playlist(&self) -> PathBuf {
        self.output_dir.join(PLAYLIST_NAME)
    }

    /// Convert into a spawnable process
    ///
    /// stdin and stdout are discarded; stderr is piped so diagnostics can be
    /// forwarded to the log. The child is killed if its handle is dropped.
    pub fn to_command(&self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::DEFAULT_LIVE_APP;

    fn key() -> StreamKey {
        StreamKey::parse("/live/station1", DEFAULT_LIVE_APP).unwrap()
    }

    fn arg_after<'a>(cmd: &'a TranscodeCommand, flag: &str) -> Option<&'a str> {
        let pos = cmd.args().iter().position(|a| a == flag)?;
        cmd.args().get(pos + 1).map(String::as_str)
    }

    #[test]
    fn test_default_invocation() {
        let cmd = TranscodeCommand::build(
            &TranscodeConfig::default(),
            "rtmp://127.0.0.1:1935/",
            Path::new("/srv/media"),
            &key(),
        );

        assert_eq!(cmd.program(), Path::new("/usr/local/bin/ffmpeg"));
        assert_eq!(cmd.input_url(), "rtmp://127.0.0.1:1935/live/station1");
        assert_eq!(arg_after(&cmd, "-i"), Some("rtmp://127.0.0.1:1935/live/station1"));
        assert_eq!(arg_after(&cmd, "-c:a"), Some("aac"));
        assert_eq!(arg_after(&cmd, "-b:a"), Some("320k"));
        assert_eq!(arg_after(&cmd, "-ar"), Some("48000"));
        assert_eq!(arg_after(&cmd, "-ac"), Some("2"));
        assert_eq!(arg_after(&cmd, "-profile:a"), Some("aac_low"));
        assert_eq!(arg_after(&cmd, "-hls_time"), Some("2"));
        assert_eq!(arg_after(&cmd, "-hls_list_size"), Some("3"));
        assert_eq!(arg_after(&cmd, "-hls_flags"), Some("delete_segments"));
        assert!(cmd.args().iter().any(|a| a == "-vn"));

        assert_eq!(cmd.output_dir(), Path::new("/srv/media/live/station1"));
        assert_eq!(
            cmd.args().last().map(String::as_str),
            Some("/srv/media/live/station1/index.m3u8")
        );
    }

    #[test]
    fn test_custom_segments_and_audio() {
        let mut config = TranscodeConfig::default().segments(6, 10).audio(96, 1, 22_050);
        config.hls_delete_segments = false;
        config.audio_profile.clear();

        let cmd = TranscodeCommand::build(&config, "rtmp://127.0.0.1:1936", Path::new("."), &key());

        assert_eq!(arg_after(&cmd, "-hls_time"), Some("6"));
        assert_eq!(arg_after(&cmd, "-hls_list_size"), Some("10"));
        assert_eq!(arg_after(&cmd, "-b:a"), Some("96k"));
        assert_eq!(arg_after(&cmd, "-ac"), Some("1"));
        assert!(arg_after(&cmd, "-hls_flags").is_none());
        assert!(arg_after(&cmd, "-profile:a").is_none());
        assert_eq!(cmd.playlist(), Path::new("./live/station1/index.m3u8"));
    }
}
