//! Platform-specific process control.
//!
//! Signal delivery, force kill, and kill-by-image-name differ per OS;
//! everything here is best-effort — callers must not build invariants on
//! these calls succeeding, since no platform offers an atomic
//! "kill if exists" primitive.

use std::process::Command;

use tracing::debug;

/// Send the platform's graceful-exit signal to a process.
///
/// Unix sends SIGTERM. Windows asks `taskkill` (without `/F`) to post a
/// close request.
///
/// # Errors
///
/// Returns an error if the signal could not be delivered, typically
/// because the process no longer exists.
pub fn send_exit_signal(pid: u32) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let nix_pid = Pid::from_raw(i32::try_from(pid).unwrap_or(i32::MAX));
        kill(nix_pid, Signal::SIGTERM).map_err(|e| std::io::Error::from_raw_os_error(e as i32))
    }

    #[cfg(windows)]
    {
        run_quiet(Command::new("taskkill").args(["/PID", &pid.to_string()]))
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = pid;
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "no graceful-exit signal on this platform",
        ))
    }
}

/// Forcefully kill a process by identifier. Best-effort: a missing
/// process is not an error worth surfacing.
pub fn force_kill(pid: u32) {
    debug!(pid, "Force killing process");

    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let nix_pid = Pid::from_raw(i32::try_from(pid).unwrap_or(i32::MAX));
        if let Err(e) = kill(nix_pid, Signal::SIGKILL) {
            debug!(pid, error = %e, "SIGKILL failed (process likely gone)");
        }
    }

    #[cfg(windows)]
    {
        if let Err(e) = run_quiet(Command::new("taskkill").args(["/F", "/PID", &pid.to_string()]))
        {
            debug!(pid, error = %e, "taskkill failed (process likely gone)");
        }
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = pid;
        tracing::warn!("Force kill not supported on this platform");
    }
}

/// Force-kill every process whose image name matches `name` exactly.
///
/// Guards against duplicate worker instances when no PID marker
/// survived. Advisory only; failures are logged and swallowed.
pub fn kill_by_name(name: &str) {
    debug!(name, "Sweeping processes by image name");

    #[cfg(windows)]
    {
        if let Err(e) = run_quiet(Command::new("taskkill").args(["/F", "/IM", name])) {
            debug!(name, error = %e, "taskkill sweep failed");
        }
    }

    #[cfg(not(windows))]
    {
        // pkill first; killall as fallback when pkill is unavailable or
        // matched nothing.
        match run_quiet(Command::new("pkill").args(["-9", "-x", name])) {
            Ok(()) => {}
            Err(e) => {
                debug!(name, error = %e, "pkill sweep failed, trying killall");
                if let Err(e) = run_quiet(Command::new("killall").args(["-9", name])) {
                    debug!(name, error = %e, "killall sweep failed");
                }
            }
        }
    }
}

/// Configure a command so the spawned process opens no console window.
/// No-op outside Windows.
pub fn hide_window(cmd: &mut tokio::process::Command) {
    #[cfg(windows)]
    {
        // CREATE_NO_WINDOW
        cmd.creation_flags(0x0800_0000);
    }

    #[cfg(not(windows))]
    {
        let _ = cmd;
    }
}

/// Run a command discarding its output, folding a non-zero exit status
/// into an error.
#[allow(dead_code)] // unused on platforms without a kill utility
fn run_quiet(cmd: &mut Command) -> std::io::Result<()> {
    let status = cmd
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()?;
    if status.success() {
        Ok(())
    } else {
        Err(std::io::Error::other(format!("command exited with {status}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_signal_to_dead_pid_errors() {
        // A pid far above any real process table entry.
        let result = send_exit_signal(u32::MAX - 1);
        assert!(result.is_err());
    }

    #[test]
    fn test_force_kill_dead_pid_does_not_panic() {
        force_kill(u32::MAX - 1);
    }

    #[test]
    fn test_kill_by_name_unknown_image_does_not_panic() {
        kill_by_name("corekeeper-no-such-image-472913");
    }
}
