//! Pipeline handle and exit outcomes

use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::sync::{oneshot, watch};

use crate::stream::StreamKey;

/// How a supervised transcoder ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineExit {
    /// Stopped on request and exited within the grace period
    Stopped,
    /// Stopped on request but had to be force-killed
    Killed,
    /// Exited cleanly without being asked to (input ended)
    Exited,
    /// Exited abnormally without being asked to
    Crashed {
        /// Exit code, `None` when terminated by a signal
        code: Option<i32>,
    },
    /// Monitor went away without reporting an outcome
    Lost,
}

impl PipelineExit {
    /// Whether the exit was unrequested and abnormal
    pub fn is_crash(self) -> bool {
        matches!(self, PipelineExit::Crashed { .. })
    }

    /// Whether the exit was the result of a stop request
    pub fn was_requested(self) -> bool {
        matches!(self, PipelineExit::Stopped | PipelineExit::Killed)
    }
}

impl fmt::Display for PipelineExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineExit::Stopped => write!(f, "stopped"),
            PipelineExit::Killed => write!(f, "killed"),
            PipelineExit::Exited => write!(f, "exited"),
            PipelineExit::Crashed { code: Some(code) } => write!(f, "crashed (exit code {})", code),
            PipelineExit::Crashed { code: None } => write!(f, "crashed (signal)"),
            PipelineExit::Lost => write!(f, "lost"),
        }
    }
}

/// Exclusive ownership of one running transcoder
///
/// The child process itself lives in a monitor task; the handle talks to it
/// through a one-shot stop request and a watch channel carrying the outcome.
/// Dropping the handle counts as a stop request, so a pipeline never outlives
/// its session.
pub struct PipelineHandle {
    key: StreamKey,
    session_id: u64,
    pid: Option<u32>,
    started_at: Instant,
    /// Termination guard: whoever takes the sender owns the stop
    stop_tx: Mutex<Option<oneshot::Sender<()>>>,
    exit_rx: watch::Receiver<Option<PipelineExit>>,
}

impl PipelineHandle {
    pub(super) fn new(
        key: StreamKey,
        session_id: u64,
        pid: Option<u32>,
        stop_tx: oneshot::Sender<()>,
        exit_rx: watch::Receiver<Option<PipelineExit>>,
    ) -> Self {
        Self {
            key,
            session_id,
            pid,
            started_at: Instant::now(),
            stop_tx: Mutex::new(Some(stop_tx)),
            exit_rx,
        }
    }

    pub fn key(&self) -> &StreamKey {
        &self.key
    }

    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// OS process id of the transcoder
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Outcome, once the pipeline has ended
    pub fn exit(&self) -> Option<PipelineExit> {
        *self.exit_rx.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.exit().is_none()
    }

    /// Ask the monitor to terminate the transcoder
    ///
    /// Returns `true` only for the call that actually delivered the request;
    /// later calls, or calls after the process already exited, return `false`.
    pub fn request_stop(&self) -> bool {
        let sender = self
            .stop_tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        match sender {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }

    /// Wait until the pipeline has ended
    pub async fn wait(&self) -> PipelineExit {
        let mut rx = self.exit_rx.clone();
        let exit = match rx.wait_for(Option::is_some).await {
            Ok(exit) => *exit,
            // Monitor dropped its sender; report what it left behind, if anything
            Err(_) => self.exit(),
        };
        exit.unwrap_or(PipelineExit::Lost)
    }
}

impl fmt::Debug for PipelineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineHandle")
            .field("key", &self.key)
            .field("session_id", &self.session_id)
            .field("pid", &self.pid)
            .field("exit", &self.exit())
            .finish()
    }
}
