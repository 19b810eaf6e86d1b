//! Stream identity
//!
//! A publish path such as `/live/station1` is normalized into a [`StreamKey`]
//! once, when the publish request arrives, and never mutated afterwards.

use std::fmt;

use serde::Serialize;

/// Application name accepted when no other is configured
pub const DEFAULT_LIVE_APP: &str = "live";

/// Opaque identifier the transport assigns to a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for ConnectionId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a live stream (application + station)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamKey {
    application: String,
    station_id: String,
}

impl StreamKey {
    /// Parse a publish path of the form `/<application>/<station_id>`.
    ///
    /// The path must split on `/` into exactly three segments: an empty leading
    /// segment, the application (which must equal `live_app`) and a non-empty
    /// station id.
    pub fn parse(path: &str, live_app: &str) -> Result<Self, InvalidPath> {
        let segments: Vec<&str> = path.split('/').collect();

        if segments.len() != 3 {
            return Err(InvalidPath::new(path, PathDefect::SegmentCount(segments.len())));
        }
        if !segments[0].is_empty() {
            return Err(InvalidPath::new(path, PathDefect::NotAbsolute));
        }
        if segments[1] != live_app {
            return Err(InvalidPath::new(path, PathDefect::Application(segments[1].to_string())));
        }

        let station_id = segments[2];
        if station_id.is_empty() {
            return Err(InvalidPath::new(path, PathDefect::EmptyStation));
        }
        // Unreachable after the split for '/', still enforced for '\'
        if station_id.contains(|c: char| c == '/' || c == '\\') {
            return Err(InvalidPath::new(path, PathDefect::Separator));
        }

        Ok(Self {
            application: segments[1].to_string(),
            station_id: station_id.to_string(),
        })
    }

    /// Application name (e.g., "live")
    pub fn application(&self) -> &str {
        &self.application
    }

    /// Station identifier (e.g., "station1")
    pub fn station_id(&self) -> &str {
        &self.station_id
    }

    /// Stream path as published, e.g. `/live/station1`
    pub fn stream_path(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.application, self.station_id)
    }
}

/// What was wrong with a rejected publish path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathDefect {
    /// Path did not split into exactly three segments
    SegmentCount(usize),
    /// Path did not start with '/'
    NotAbsolute,
    /// Application segment is not the configured live application
    Application(String),
    /// Station segment is empty
    EmptyStation,
    /// Station segment contains a path separator
    Separator,
}

impl fmt::Display for PathDefect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathDefect::SegmentCount(n) => write!(f, "expected 3 segments, found {}", n),
            PathDefect::NotAbsolute => write!(f, "path must start with '/'"),
            PathDefect::Application(app) => write!(f, "unknown application '{}'", app),
            PathDefect::EmptyStation => write!(f, "empty station id"),
            PathDefect::Separator => write!(f, "station id contains a path separator"),
        }
    }
}

/// A publish path that does not name a valid live stream
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid stream path '{path}': {defect}")]
pub struct InvalidPath {
    pub path: String,
    pub defect: PathDefect,
}

impl InvalidPath {
    fn new(path: &str, defect: PathDefect) -> Self {
        Self {
            path: path.to_string(),
            defect,
        }
    }
}
