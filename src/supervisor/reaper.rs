//! Orphan recovery.
//!
//! A worker left behind by a crashed session is found through the PID
//! marker file written at its launch. Recovery force-kills the recorded
//! pid and removes the marker; a name-based sweep then catches instances
//! that never had a marker. Both steps are best-effort: liveness checks
//! are racy on every platform, so the kill attempt itself is the check.

use std::path::Path;

use tracing::{debug, info, warn};

use crate::platform;

/// Kill the process recorded in a previous session's PID marker and
/// delete the marker.
///
/// A missing marker is a no-op. Unparseable content is discarded along
/// with the marker. Never fails the caller — every error is logged and
/// swallowed.
pub fn reap_previous_instance(pid_path: &Path) {
    let content = match std::fs::read_to_string(pid_path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
        Err(e) => {
            warn!(path = %pid_path.display(), error = %e, "Failed to read PID marker");
            return;
        }
    };

    match content.trim().parse::<u32>() {
        Ok(pid) => {
            info!(pid, "Found orphaned worker from previous session, killing it");
            platform::force_kill(pid);
        }
        Err(e) => {
            warn!(
                path = %pid_path.display(),
                content = %content.trim(),
                error = %e,
                "PID marker did not contain a process identifier"
            );
        }
    }

    // Marker goes away regardless of whether the kill found anything.
    if let Err(e) = std::fs::remove_file(pid_path) {
        warn!(path = %pid_path.display(), error = %e, "Failed to remove stale PID marker");
    } else {
        debug!(path = %pid_path.display(), "Removed stale PID marker");
    }
}

/// Force-kill any other process sharing the worker executable's base
/// name. Guards against duplicate instances when no marker survived.
pub fn sweep_by_executable(exe_path: &Path) {
    if let Some(name) = exe_path.file_name().and_then(|n| n.to_str()) {
        platform::kill_by_name(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_missing_marker_is_noop() {
        reap_previous_instance(Path::new("/tmp/corekeeper-no-such-marker.pid"));
    }

    #[test]
    fn test_stale_marker_removed() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("core.pid");
        // A pid that cannot belong to a live process.
        std::fs::write(&marker, "4000000000").unwrap();

        reap_previous_instance(&marker);
        assert!(!marker.exists());
    }

    #[test]
    fn test_garbage_marker_removed() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("core.pid");
        std::fs::write(&marker, "not-a-pid\n").unwrap();

        reap_previous_instance(&marker);
        assert!(!marker.exists());
    }

    #[test]
    fn test_marker_with_whitespace_parses() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("core.pid");
        std::fs::write(&marker, "  4000000000 \n").unwrap();

        reap_previous_instance(&marker);
        assert!(!marker.exists());
    }

    #[test]
    fn test_sweep_with_unique_name_is_harmless() {
        sweep_by_executable(&PathBuf::from("/opt/app/corekeeper-sweep-test-998877"));
    }
}
