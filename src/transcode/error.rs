//! Transcoder spawn errors

use std::io;
use std::path::PathBuf;
use std::time::Duration;

/// Why a transcoder could not be started
///
/// Always fatal for the publish attempt that triggered it. Spawns are never
/// retried; the next publish gets a fresh attempt.
#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    /// Executable does not exist at the configured path
    #[error("transcoder executable not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Operating system refused to start the process
    #[error("failed to start {}: {source}", .program.display())]
    Io {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Segment output directory could not be created
    #[error("cannot create output directory {}: {source}", .path.display())]
    OutputDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Spawning took longer than the configured timeout
    #[error("transcoder did not start within {0:?}")]
    Timeout(Duration),

    /// The spawn worker task panicked or was cancelled
    #[error("spawn worker failed: {0}")]
    Worker(String),
}
