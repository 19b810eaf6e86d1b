//! Lifecycle notifications for external observers
//!
//! The registry and gate emit events as sessions move through their phases.
//! Observers (a status API, a webhook relay) subscribe without ever blocking
//! the publish path.
//!
//! Ordering: events for a single stream key arrive in the order they were
//! generated (`prePublish`, `published`, `pipelineCrashed`, `stopped`).
//! Nothing is guaranteed across different keys beyond the sequence numbers.

pub mod bus;
pub mod event;

pub use bus::{EventBus, EventSubscription, DEFAULT_EVENT_CAPACITY};
pub use event::{EventKind, LifecycleEvent};
