//! Per-stream lifecycle state machine
//!
//! ```text
//!   Idle ──commit──► Publishing ──pipeline up──► Live
//!                         │                        │
//!                         └──────── release ───────┴──► Stopped
//! ```
//!
//! `Idle` is the implicit state of every key with no registry entry.
//! `Stopped` is terminal: a new publish creates a fresh session.

use std::fmt;

use serde::Serialize;

/// Lifecycle phase of a stream session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StreamPhase {
    /// No session under this key
    Idle,
    /// Session committed, transcoder not yet running
    Publishing,
    /// Transcoder running, stream reported as active
    Live,
    /// Session released
    Stopped,
}

impl StreamPhase {
    /// Whether the FSM allows moving from `self` to `next`
    pub fn can_transition(self, next: StreamPhase) -> bool {
        use StreamPhase::*;

        matches!(
            (self, next),
            (Idle, Publishing) | (Publishing, Live) | (Publishing, Stopped) | (Live, Stopped)
        )
    }

    /// Move to `next`, or report the illegal transition
    pub fn transition(&mut self, next: StreamPhase) -> Result<(), InvalidTransition> {
        if !self.can_transition(next) {
            return Err(InvalidTransition {
                from: *self,
                to: next,
            });
        }
        *self = next;
        Ok(())
    }

    pub fn is_live(self) -> bool {
        self == StreamPhase::Live
    }
}

impl fmt::Display for StreamPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StreamPhase::Idle => "idle",
            StreamPhase::Publishing => "publishing",
            StreamPhase::Live => "live",
            StreamPhase::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Refused phase change
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid stream transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: StreamPhase,
    pub to: StreamPhase,
}
