//! Registry error types
//!
//! Error types for session registry operations.

use std::fmt;

use crate::stream::{ConnectionId, InvalidTransition, StreamKey};
use crate::transcode::PipelineHandle;

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Another publisher committed this key first
    #[error("stream already exists: {0}")]
    AlreadyExists(StreamKey),

    /// Connection already owns a live session
    #[error("connection {0} already publishes a stream")]
    ConnectionBusy(ConnectionId),

    /// Session was released (or replaced) before the operation ran
    #[error("session not found: {0}")]
    SessionNotFound(StreamKey),

    /// Phase change refused by the stream state machine
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
}

/// A pipeline that could not be attached to its session
///
/// Ownership goes back to the caller, which must stop it.
#[derive(Debug)]
pub struct Detached {
    pub error: RegistryError,
    pub pipeline: PipelineHandle,
}

impl fmt::Display for Detached {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pipeline detached: {}", self.error)
    }
}

impl std::error::Error for Detached {}
