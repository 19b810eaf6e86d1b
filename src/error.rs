//! Error types

use crate::registry::RegistryError;
use crate::server::RejectReason;
use crate::stream::{InvalidPath, StreamKey};
use crate::transcode::SpawnError;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Publish path does not name a live stream (client-caused)
    #[error(transparent)]
    InvalidPath(#[from] InvalidPath),

    /// Another publisher won the race for this key
    #[error("stream already exists: {0}")]
    AlreadyExists(StreamKey),

    /// Transcoder could not be started
    #[error("transcoder failed to start: {0}")]
    Spawn(#[from] SpawnError),

    /// Transcoder died while the stream was live
    #[error("pipeline for {key} crashed (exit code {code:?})")]
    PipelineCrashed { key: StreamKey, code: Option<i32> },

    #[error(transparent)]
    Registry(RegistryError),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<RegistryError> for Error {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::AlreadyExists(key) => Error::AlreadyExists(key),
            other => Error::Registry(other),
        }
    }
}

impl Error {
    /// Why the transport should refuse the connection, for publish-time errors
    pub fn reject_reason(&self) -> Option<RejectReason> {
        match self {
            Error::InvalidPath(_) => Some(RejectReason::MalformedPath),
            Error::AlreadyExists(_) | Error::Registry(RegistryError::ConnectionBusy(_)) => {
                Some(RejectReason::DuplicateStream)
            }
            Error::Spawn(_) => Some(RejectReason::SpawnFailed),
            Error::Registry(RegistryError::SessionNotFound(_)) => Some(RejectReason::Aborted),
            _ => None,
        }
    }
}
