//! Stream identity, publisher metadata and lifecycle phases

pub mod key;
pub mod metadata;
pub mod state;

pub use key::{ConnectionId, InvalidPath, PathDefect, StreamKey, DEFAULT_LIVE_APP};
pub use metadata::{MetadataValue, PublishMetadata};
pub use state::{InvalidTransition, StreamPhase};
