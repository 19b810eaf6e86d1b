//! Transcoder supervision
//!
//! One external transcoder per live session. The supervisor launches it off
//! the connection path, watches it in a background task, and tears it down on
//! request with a bounded grace period.
//!
//! Crash policy: no automatic restart. A transcoder that exits on its own
//! takes its session down with it, so the publisher can reconnect cleanly
//! instead of feeding an unhealthy encoder.

use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr};
use tokio::sync::{oneshot, watch};

use crate::registry::{SessionHandle, SessionRegistry};
use crate::stream::StreamKey;

use super::command::TranscodeCommand;
use super::config::TranscodeConfig;
use super::error::SpawnError;
use super::handle::{PipelineExit, PipelineHandle};

/// Launches, monitors and stops per-stream transcoders
pub struct TranscodeSupervisor {
    config: TranscodeConfig,

    /// Local RTMP endpoint the transcoder pulls from
    input_base: String,

    /// Root directory for HLS output
    media_root: PathBuf,

    /// Crash reports go here; weak so monitors never keep the registry alive
    registry: Weak<SessionRegistry>,
}

impl TranscodeSupervisor {
    pub fn new(
        config: TranscodeConfig,
        input_base: impl Into<String>,
        media_root: impl Into<PathBuf>,
        registry: &Arc<SessionRegistry>,
    ) -> Self {
        Self {
            config,
            input_base: input_base.into(),
            media_root: media_root.into(),
            registry: Arc::downgrade(registry),
        }
    }

    pub fn config(&self) -> &TranscodeConfig {
        &self.config
    }

    /// The invocation that `start` would run for `key`
    pub fn command_for(&self, key: &StreamKey) -> TranscodeCommand {
        TranscodeCommand::build(&self.config, &self.input_base, &self.media_root, key)
    }

    /// Launch the transcoder for a committed session
    ///
    /// The process is spawned on the blocking pool under the configured spawn
    /// timeout; a background monitor is attached before this returns.
    pub async fn start(&self, session: &SessionHandle) -> Result<PipelineHandle, SpawnError> {
        let command = self.command_for(&session.key);

        tokio::fs::create_dir_all(command.output_dir())
            .await
            .map_err(|source| SpawnError::OutputDir {
                path: command.output_dir().to_path_buf(),
                source,
            })?;

        let mut process = command.to_command();
        let program = command.program().to_path_buf();
        let timeout = self.config.spawn_timeout();

        let mut child = spawn_within(timeout, program.clone(), move || process.spawn()).await?;

        let pid = child.id();
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_stderr(session.key.clone(), stderr));
        }

        let (stop_tx, stop_rx) = oneshot::channel();
        let (exit_tx, exit_rx) = watch::channel(None);

        tokio::spawn(monitor(
            child,
            stop_rx,
            exit_tx,
            MonitorContext {
                session: session.clone(),
                stop_timeout: self.config.stop_timeout(),
                registry: self.registry.clone(),
            },
        ));

        tracing::info!(
            stream = %session.key,
            connection_id = %session.connection_id,
            pid = ?pid,
            program = %program.display(),
            output = %command.playlist().display(),
            "Transcoder started"
        );

        Ok(PipelineHandle::new(
            session.key.clone(),
            session.session_id,
            pid,
            stop_tx,
            exit_rx,
        ))
    }

    /// Terminate a pipeline and wait for it to be gone
    ///
    /// Sends a graceful termination signal, waits up to the stop timeout, then
    /// kills. Safe to call concurrently and to race with the monitor's crash
    /// path: the process is reaped exactly once and every caller sees the
    /// same outcome.
    pub async fn stop(&self, handle: &PipelineHandle) -> PipelineExit {
        let initiated = handle.request_stop();
        let exit = handle.wait().await;

        tracing::info!(
            stream = %handle.key(),
            pid = ?handle.pid(),
            uptime_ms = handle.uptime().as_millis() as u64,
            initiated = initiated,
            outcome = %exit,
            "Transcoder stopped"
        );
        exit
    }
}

/// Run a blocking spawn on the blocking pool under `timeout`
///
/// `Command::spawn` forks and waits for exec to report back, so it must not
/// run on a runtime worker. A child that only appears after the timeout fired
/// is dropped by the pool thread and killed.
async fn spawn_within<F>(timeout: Duration, program: PathBuf, spawn: F) -> Result<Child, SpawnError>
where
    F: FnOnce() -> io::Result<Child> + Send + 'static,
{
    let worker = tokio::task::spawn_blocking(spawn);
    match tokio::time::timeout(timeout, worker).await {
        Ok(Ok(Ok(child))) => Ok(child),
        Ok(Ok(Err(e))) if e.kind() == io::ErrorKind::NotFound => Err(SpawnError::NotFound(program)),
        Ok(Ok(Err(source))) => Err(SpawnError::Io { program, source }),
        Ok(Err(join_error)) => Err(SpawnError::Worker(join_error.to_string())),
        Err(_) => Err(SpawnError::Timeout(timeout)),
    }
}

struct MonitorContext {
    session: SessionHandle,
    stop_timeout: Duration,
    registry: Weak<SessionRegistry>,
}

/// Background watcher owning the child process
///
/// Ends exactly when the process has been reaped, either because it exited on
/// its own or because a stop was requested (or the handle was dropped).
async fn monitor(
    mut child: Child,
    mut stop_rx: oneshot::Receiver<()>,
    exit_tx: watch::Sender<Option<PipelineExit>>,
    ctx: MonitorContext,
) {
    let exit = tokio::select! {
        status = child.wait() => unrequested_exit(&ctx.session.key, status),
        _ = &mut stop_rx => terminate(&mut child, &ctx.session.key, ctx.stop_timeout).await,
    };

    exit_tx.send_replace(Some(exit));

    if exit.was_requested() {
        return;
    }

    // Unrequested exit: the session is dead, release it if it is still ours
    let Some(registry) = ctx.registry.upgrade() else {
        return;
    };
    match exit {
        PipelineExit::Crashed { code } => {
            registry
                .release_crashed(&ctx.session.key, ctx.session.session_id, code)
                .await;
        }
        _ => {
            registry.release_session(&ctx.session).await;
        }
    }
}

fn unrequested_exit(key: &StreamKey, status: io::Result<ExitStatus>) -> PipelineExit {
    match status {
        Ok(status) if status.success() => {
            tracing::info!(stream = %key, "Transcoder exited");
            PipelineExit::Exited
        }
        Ok(status) => {
            tracing::error!(stream = %key, status = %status, "Transcoder exited abnormally");
            PipelineExit::Crashed {
                code: status.code(),
            }
        }
        Err(e) => {
            tracing::error!(stream = %key, error = %e, "Lost track of transcoder");
            PipelineExit::Crashed { code: None }
        }
    }
}

async fn terminate(child: &mut Child, key: &StreamKey, grace: Duration) -> PipelineExit {
    if let Ok(Some(_)) = child.try_wait() {
        return PipelineExit::Stopped;
    }

    if let Err(e) = signal_terminate(child) {
        tracing::debug!(stream = %key, error = %e, "Termination signal failed");
    }

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(_) => PipelineExit::Stopped,
        Err(_) => {
            tracing::warn!(
                stream = %key,
                grace_ms = grace.as_millis() as u64,
                "Transcoder ignored termination, killing"
            );
            if let Err(e) = child.kill().await {
                tracing::error!(stream = %key, error = %e, "Failed to kill transcoder");
            }
            PipelineExit::Killed
        }
    }
}

#[cfg(unix)]
fn signal_terminate(child: &mut Child) -> io::Result<()> {
    let Some(pid) = child.id() else {
        return Ok(());
    };
    // SAFETY: `pid` is our own child and has not been reaped yet (`id()` is
    // `None` after reaping), so it cannot refer to a recycled process.
    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn signal_terminate(child: &mut Child) -> io::Result<()> {
    child.start_kill()
}

/// Log transcoder diagnostics until the pipe closes
///
/// Lines are read as raw bytes: ffmpeg echoes stream titles in whatever
/// encoding the publisher used. The pipe is drained to EOF no matter what,
/// since closing it early would kill the child with SIGPIPE.
async fn forward_stderr(key: StreamKey, stderr: ChildStderr) {
    let mut reader = BufReader::new(stderr);
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => return,
            Ok(_) => {
                let text = String::from_utf8_lossy(&line);
                tracing::debug!(stream = %key, "transcoder: {}", text.trim_end());
            }
            Err(e) => {
                tracing::debug!(stream = %key, error = %e, "Transcoder stderr unreadable, discarding");
                let mut rest = reader.into_inner();
                if let Err(e) = tokio::io::copy(&mut rest, &mut tokio::io::sink()).await {
                    tracing::debug!(stream = %key, error = %e, "Transcoder stderr closed");
                }
                return;
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    use super::*;
    use crate::events::{EventBus, EventKind};
    use crate::stream::{ConnectionId, PublishMetadata, DEFAULT_LIVE_APP};

    fn key(station: &str) -> StreamKey {
        StreamKey::parse(&format!("/live/{}", station), DEFAULT_LIVE_APP).unwrap()
    }

    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    /// Whether `pid` is alive, counting an unreaped zombie as gone
    fn is_running(pid: u32) -> bool {
        if !cfg!(target_os = "linux") {
            return unsafe { libc::kill(pid as libc::pid_t, 0) } == 0;
        }
        let Ok(stat) = std::fs::read_to_string(format!("/proc/{}/stat", pid)) else {
            return false;
        };
        // State is the first field after the parenthesised command name
        let state = stat
            .rfind(')')
            .and_then(|i| stat[i + 1..].trim_start().chars().next());
        matches!(state, Some(s) if s != 'Z' && s != 'X')
    }

    struct Fixture {
        dir: tempfile::TempDir,
        bus: EventBus,
        registry: Arc<SessionRegistry>,
    }

    impl Fixture {
        fn new() -> Self {
            let bus = EventBus::new();
            Self {
                dir: tempfile::tempdir().unwrap(),
                registry: Arc::new(SessionRegistry::new(bus.clone())),
                bus,
            }
        }

        fn supervisor(&self, body: &str) -> TranscodeSupervisor {
            let exe = script(self.dir.path(), "fake-ffmpeg", body);
            let config = TranscodeConfig::default()
                .executable(exe)
                .stop_timeout_ms(300);
            TranscodeSupervisor::new(
                config,
                "rtmp://127.0.0.1:1935",
                self.dir.path().join("media"),
                &self.registry,
            )
        }

        async fn commit(&self, station: &str) -> SessionHandle {
            self.registry
                .commit(key(station), ConnectionId::new(1), PublishMetadata::new())
                .await
                .unwrap()
        }
    }

    #[tokio::test]
    async fn test_missing_executable() {
        let fx = Fixture::new();
        let supervisor = TranscodeSupervisor::new(
            TranscodeConfig::default().executable(fx.dir.path().join("no-such-ffmpeg")),
            "rtmp://127.0.0.1:1935",
            fx.dir.path(),
            &fx.registry,
        );
        let session = fx.commit("s1").await;

        let err = supervisor.start(&session).await.unwrap_err();
        assert!(matches!(err, SpawnError::NotFound(_)), "{:?}", err);
    }

    #[tokio::test]
    async fn test_start_creates_output_dir_and_stops_gracefully() {
        let fx = Fixture::new();
        let supervisor = fx.supervisor("exec sleep 30");
        let session = fx.commit("s1").await;

        let handle = supervisor.start(&session).await.unwrap();
        assert!(handle.pid().is_some());
        assert!(handle.is_running());
        assert!(fx.dir.path().join("media/live/s1").is_dir());

        assert_eq!(supervisor.stop(&handle).await, PipelineExit::Stopped);
        // Requested stop never releases the session on its own
        assert!(fx.registry.contains(&key("s1")).await);
    }

    #[tokio::test]
    async fn test_stop_escalates_to_kill() {
        let fx = Fixture::new();
        let supervisor = fx.supervisor("trap '' TERM\nexec sleep 30");
        let session = fx.commit("s1").await;

        let handle = supervisor.start(&session).await.unwrap();
        // Give the shell time to install the trap
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(supervisor.stop(&handle).await, PipelineExit::Killed);
    }

    #[tokio::test]
    async fn test_crash_releases_session() {
        let fx = Fixture::new();
        let mut events = fx.bus.subscribe().for_key(key("s1"));
        let supervisor = fx.supervisor("sleep 0.1\nexit 3");
        let session = fx.commit("s1").await;

        let handle = supervisor.start(&session).await.unwrap();
        fx.registry.attach_pipeline(&session, handle).await.unwrap();

        let mut kinds = Vec::new();
        while kinds.last() != Some(&EventKind::Stopped) {
            let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
                .await
                .expect("no event before timeout")
                .unwrap();
            kinds.push(event.kind);
        }

        assert_eq!(
            kinds,
            [
                EventKind::Published,
                EventKind::PipelineCrashed { code: Some(3) },
                EventKind::Stopped
            ]
        );
        assert!(fx.registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_clean_exit_releases_without_crash_event() {
        let fx = Fixture::new();
        let mut events = fx.bus.subscribe();
        let supervisor = fx.supervisor("exit 0");
        let session = fx.commit("s1").await;

        let handle = supervisor.start(&session).await.unwrap();
        assert_eq!(handle.wait().await, PipelineExit::Exited);

        let stopped = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stopped.kind, EventKind::Stopped);
        assert!(fx.registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_stop_after_crash_reports_crash_once() {
        let fx = Fixture::new();
        let supervisor = fx.supervisor("exit 7");
        let session = fx.commit("s1").await;

        let handle = supervisor.start(&session).await.unwrap();
        let crashed = handle.wait().await;
        assert_eq!(crashed, PipelineExit::Crashed { code: Some(7) });

        // The disconnect path arriving late sees the same outcome, no second reap
        assert!(!handle.request_stop());
        assert_eq!(supervisor.stop(&handle).await, crashed);
    }

    #[tokio::test]
    async fn test_undecodable_stderr_keeps_pipeline_alive() {
        let fx = Fixture::new();
        let supervisor = fx.supervisor(
            "printf 'title: caf\\351\\n' >&2\nwhile true; do sleep 0.1; echo tick >&2; done",
        );
        let session = fx.commit("s1").await;

        let handle = supervisor.start(&session).await.unwrap();
        tokio::time::sleep(Duration::from_millis(800)).await;

        assert!(handle.is_running(), "exited with {:?}", handle.exit());
        assert!(fx.registry.contains(&key("s1")).await);
        assert!(supervisor.stop(&handle).await.was_requested());
    }

    #[tokio::test]
    async fn test_spawn_timeout() {
        let fx = Fixture::new();
        let session = fx.commit("s1").await;
        let spawned = Arc::new(std::sync::Mutex::new(None));

        let slot = spawned.clone();
        let slow_spawn = move || -> io::Result<Child> {
            std::thread::sleep(Duration::from_millis(300));
            let child = tokio::process::Command::new("sleep")
                .arg("30")
                .kill_on_drop(true)
                .spawn()?;
            *slot.lock().unwrap() = child.id();
            Ok(child)
        };

        let timeout = Duration::from_millis(50);
        let err = spawn_within(timeout, PathBuf::from("sleep"), slow_spawn)
            .await
            .unwrap_err();
        assert!(matches!(err, SpawnError::Timeout(t) if t == timeout), "{:?}", err);

        // What the publish path does with a failed start
        fx.registry.release_session(&session).await;
        assert!(fx.registry.is_empty().await);

        // The late child is killed as soon as the pool thread drops it
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let pid = *spawned.lock().unwrap();
            match pid {
                Some(pid) if !is_running(pid) => break,
                _ => {
                    assert!(tokio::time::Instant::now() < deadline, "late child still running");
                    tokio::time::sleep(Duration::from_millis(20)).await;
                }
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_stops_share_outcome() {
        let fx = Fixture::new();
        let supervisor = Arc::new(fx.supervisor("exec sleep 30"));
        let session = fx.commit("s1").await;

        let handle = Arc::new(supervisor.start(&session).await.unwrap());
        let pid = handle.pid().unwrap();

        let stopper = |supervisor: Arc<TranscodeSupervisor>, handle: Arc<PipelineHandle>| {
            tokio::spawn(async move { supervisor.stop(&handle).await })
        };
        let (first, second) = tokio::join!(
            stopper(supervisor.clone(), handle.clone()),
            stopper(supervisor.clone(), handle.clone())
        );

        assert_eq!(first.unwrap(), PipelineExit::Stopped);
        assert_eq!(second.unwrap(), PipelineExit::Stopped);
        assert_eq!(handle.exit(), Some(PipelineExit::Stopped));
        assert!(!handle.request_stop());
        assert!(!is_running(pid));
    }

    #[tokio::test]
    async fn test_dropping_handle_terminates_process() {
        let fx = Fixture::new();
        let supervisor = fx.supervisor("exec sleep 30");
        let session = fx.commit("s1").await;

        let handle = supervisor.start(&session).await.unwrap();
        let pid = handle.pid().unwrap() as libc::pid_t;
        drop(handle);

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        // kill(pid, 0) fails once the monitor has reaped the child
        while unsafe { libc::kill(pid, 0) } == 0 {
            assert!(tokio::time::Instant::now() < deadline, "process still alive");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}
