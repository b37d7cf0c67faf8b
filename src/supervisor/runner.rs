//! Worker lifecycle orchestration.
//!
//! [`CoreSupervisor`] owns the shared state and wires together orphan
//! recovery, process spawning, log streaming, and exit monitoring. One
//! supervisor tracks at most one worker; a second launch while a worker
//! is running is rejected without side effects.

use std::fs::File;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Command;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::events::{CoreEvent, EventSink};
use crate::paths::PathResolver;
use crate::platform;
use crate::supervisor::reaper;
use crate::supervisor::state::{CoreState, LaunchOptions};
use crate::supervisor::streamer;

/// Bounded wait for the worker to die after a Stop request.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Error type for launch operations.
#[derive(thiserror::Error, Debug)]
pub enum LaunchError {
    /// A worker is already tracked as running.
    #[error("Core is already running")]
    AlreadyRunning,
    /// The OS refused to start the process.
    #[error("Failed to start core: {0}")]
    Spawn(#[from] std::io::Error),
    /// The process started but reported no pid.
    #[error("Core started without a process identifier")]
    NoPid,
}

/// Error type for stop operations.
#[derive(thiserror::Error, Debug)]
pub enum StopError {
    /// The worker did not terminate within [`STOP_TIMEOUT`].
    ///
    /// The process may still die later; the exit monitor cleans up
    /// whenever it does.
    #[error("Core did not exit within {0:?}")]
    Timeout(Duration),
}

/// Outcome of a stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// No worker was running; nothing was done.
    NotRunning,
    /// The worker terminated within the timeout.
    Stopped,
}

/// Supervisor for a single long-running worker process.
pub struct CoreSupervisor {
    state: Arc<Mutex<CoreState>>,
    resolver: Arc<dyn PathResolver>,
    sink: Arc<dyn EventSink>,
    /// The exit monitor publishes its generation here on termination so
    /// Stop can wait for the worker to actually die.
    exit_tx: watch::Sender<u64>,
    exit_on_shutdown: bool,
}

impl CoreSupervisor {
    /// Create a supervisor with the given path resolver and observer.
    #[must_use = "the supervisor does nothing until launch is called"]
    pub fn new(resolver: impl PathResolver, sink: impl EventSink) -> Self {
        let (exit_tx, _) = watch::channel(0);
        Self {
            state: Arc::new(Mutex::new(CoreState::default())),
            resolver: Arc::new(resolver),
            sink: Arc::new(sink),
            exit_tx,
            exit_on_shutdown: false,
        }
    }

    /// Kill the worker when [`CoreSupervisor::shutdown`] is invoked.
    #[must_use]
    pub fn with_exit_on_shutdown(mut self, exit: bool) -> Self {
        self.exit_on_shutdown = exit;
        self
    }

    /// Whether a worker is currently tracked as running.
    pub async fn is_running(&self) -> bool {
        self.state.lock().await.running
    }

    /// Identifier of the tracked worker, if one is running.
    pub async fn pid(&self) -> Option<u32> {
        self.state.lock().await.pid
    }

    /// Launch the worker.
    ///
    /// Recovers orphans from a previous session, sweeps duplicate
    /// instances by executable name, spawns the process with merged
    /// environment and combined output, writes the PID marker, and arms
    /// the log streamer and exit monitor.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError::AlreadyRunning`] if a worker is tracked,
    /// or [`LaunchError::Spawn`] if the process fails to start; state is
    /// untouched in both cases.
    pub async fn launch(
        &self,
        executable: &str,
        args: &[String],
        options: &LaunchOptions,
    ) -> Result<u32, LaunchError> {
        // Held for the whole launch path: serializes launches and keeps
        // Stop/monitor from observing a half-initialized state.
        let mut state = self.state.lock().await;

        if state.running {
            return Err(LaunchError::AlreadyRunning);
        }

        // Bundled binary first, bare command name as fallback.
        let mut exe_path = self.resolver.resolve(executable);
        if !exe_path.exists() {
            exe_path = executable.into();
        }

        // Orphan recovery from the previous session's marker.
        let pid_path = options
            .pid_file
            .as_deref()
            .map(|logical| self.resolver.resolve(logical));
        if let Some(ref marker) = pid_path {
            reaper::reap_previous_instance(marker);
        }

        // Duplicate instances that never had a marker.
        reaper::sweep_by_executable(&exe_path);

        let log_file = options
            .log_file
            .as_deref()
            .and_then(|logical| self.open_log_file(logical));

        let mut cmd = Command::new(&exe_path);
        cmd.args(args)
            .envs(&options.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        platform::hide_window(&mut cmd);

        let mut child = cmd.spawn()?;
        let pid = child.id().ok_or(LaunchError::NoPid)?;
        info!(pid, exe = %exe_path.display(), "Core started");

        // Both pipes were requested above; spawn hands them over.
        let stdout = child.stdout.take().ok_or(LaunchError::NoPid)?;
        let stderr = child.stderr.take().ok_or(LaunchError::NoPid)?;

        if let Some(ref marker) = pid_path {
            if let Err(e) = std::fs::write(marker, pid.to_string()) {
                warn!(path = %marker.display(), error = %e, "Failed to write PID marker");
            }
        }

        state.running = true;
        state.pid = Some(pid);
        state.pid_path = pid_path;
        state.generation += 1;
        let generation = state.generation;

        let streamer = streamer::spawn(
            stdout,
            stderr,
            log_file,
            options.ready_keyword.clone(),
            Arc::clone(&self.sink),
        );

        tokio::spawn(monitor_exit(
            child,
            streamer,
            generation,
            Arc::clone(&self.state),
            Arc::clone(&self.sink),
            self.exit_tx.clone(),
        ));

        Ok(pid)
    }

    /// Stop the worker.
    ///
    /// Sends the platform graceful-exit signal (force-killing if the
    /// signal cannot be delivered) and waits up to [`STOP_TIMEOUT`] for
    /// the exit monitor to observe termination. Cleanup itself is the
    /// monitor's job — Stop only observes.
    ///
    /// # Errors
    ///
    /// Returns [`StopError::Timeout`] if the worker is still alive when
    /// the wait expires.
    pub async fn stop(&self) -> Result<StopOutcome, StopError> {
        let (pid, generation) = {
            let state = self.state.lock().await;
            let Some(pid) = state.pid.filter(|_| state.running) else {
                debug!("Stop requested but core is not running");
                return Ok(StopOutcome::NotRunning);
            };
            (pid, state.generation)
        };

        // Subscribe before signaling so the exit cannot slip past us.
        let mut exited = self.exit_tx.subscribe();

        if let Err(e) = platform::send_exit_signal(pid) {
            warn!(pid, error = %e, "Exit signal failed, force killing");
            platform::force_kill(pid);
        }

        let outcome =
            match tokio::time::timeout(STOP_TIMEOUT, exited.wait_for(|g| *g >= generation)).await {
                Ok(Ok(_)) => {
                    info!(pid, "Core stopped");
                    Ok(StopOutcome::Stopped)
                }
                // The sender lives in self, so wait_for only fails if the
                // supervisor is being torn down; treat it like a timeout.
                Ok(Err(_)) | Err(_) => Err(StopError::Timeout(STOP_TIMEOUT)),
            };
        outcome
    }

    /// Host-shutdown hook.
    ///
    /// When constructed with `with_exit_on_shutdown(true)`, force-kills
    /// the worker without a graceful signal and marks the state
    /// not-running directly — the host process is exiting, so the full
    /// monitor cleanup is not awaited. Otherwise the worker is
    /// deliberately left running.
    pub async fn shutdown(&self) {
        if !self.exit_on_shutdown {
            info!("Keeping core running across host shutdown as configured");
            return;
        }

        let mut state = self.state.lock().await;
        if let Some(pid) = state.pid.filter(|_| state.running) {
            info!(pid, "Host shutting down, force killing core");
            platform::force_kill(pid);
            state.running = false;
        }
    }

    /// Open the mirror log file, truncating prior content and creating
    /// parent directories. Failures disable file mirroring but never
    /// fail the launch.
    fn open_log_file(&self, logical: &str) -> Option<File> {
        let path = self.resolver.resolve(logical);
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!(path = %path.display(), error = %e, "Failed to create log directory");
                return None;
            }
        }
        match File::create(&path) {
            Ok(file) => Some(file),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to open log file");
                None
            }
        }
    }
}

/// Exit monitor: the single authoritative cleanup path.
///
/// Waits for the worker to die (for any reason), drains the streamer so
/// the terminal notification follows the final log flush, then clears
/// state, removes the PID marker, and emits the terminal event — exactly
/// once per worker instance, guarded by the generation counter.
async fn monitor_exit(
    mut child: tokio::process::Child,
    streamer: tokio::task::JoinHandle<()>,
    generation: u64,
    state: Arc<Mutex<CoreState>>,
    sink: Arc<dyn EventSink>,
    exit_tx: watch::Sender<u64>,
) {
    let status = child.wait().await;

    // Let Stop observe the termination right away; cleanup below races
    // with Stop's return by design. Monotonic so a slow old monitor
    // cannot mask a newer exit.
    exit_tx.send_modify(|g| *g = (*g).max(generation));

    // The worker is gone but a grandchild may still hold the pipes; the
    // streamer ends once they close, flushing what it already read.
    if let Err(e) = streamer.await {
        debug!(error = %e, "Log streamer task ended abnormally");
    }

    let mut state = state.lock().await;
    if state.generation == generation && state.running {
        if let Some(marker) = state.clear() {
            if let Err(e) = std::fs::remove_file(&marker) {
                warn!(path = %marker.display(), error = %e, "Failed to remove PID marker");
            }
        }

        let error = match status {
            Ok(s) if s.success() => None,
            Ok(s) => Some(format!("Core exited with {s}")),
            Err(e) => Some(format!("Failed to observe core exit: {e}")),
        };
        match &error {
            None => info!("Core stopped cleanly"),
            Some(msg) => warn!("{msg}"),
        }
        sink.emit(CoreEvent::Stopped { error });
    }
}
