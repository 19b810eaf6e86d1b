//! Session registry
//!
//! The registry owns every active publish session and enforces the core
//! invariant: at most one session per stream key at any observable instant.
//!
//! # Architecture
//!
//! ```text
//!                        Arc<SessionRegistry>
//!                   ┌──────────────────────────────┐
//!                   │ RwLock<                      │
//!                   │   by_key: HashMap<Key,       │
//!                   │     StreamSession {          │
//!                   │       phase, metadata,       │
//!                   │       pipeline: Handle,      │
//!                   │     }>                       │
//!                   │   by_connection: Conn -> Key │
//!                   │ >                            │
//!                   └──────────────┬───────────────┘
//!                                  │
//!        ┌─────────────────────────┼─────────────────────────┐
//!        │                         │                         │
//!        ▼                         ▼                         ▼
//!   [PublishGate]          [IngestServer]           [Pipeline monitor]
//!   contains() (advisory)  commit()/release()       release_crashed()
//! ```
//!
//! # Two-phase publish
//!
//! The gate only reads. The registry's `commit` is the authoritative,
//! atomic insert-or-fail, so two publishers racing past the gate still end up
//! with exactly one winner.

pub mod entry;
pub mod error;
pub mod store;

pub use entry::{SessionHandle, SessionSnapshot, StreamSession};
pub use error::{Detached, RegistryError};
pub use store::SessionRegistry;
