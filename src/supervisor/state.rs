//! Shared supervisor state and launch options.

use std::collections::HashMap;
use std::path::PathBuf;

/// Mutable record shared between Launch, Stop, and the exit monitor.
///
/// Guarded by a single `tokio::sync::Mutex`; the lock is never held
/// across process waits or pipe reads. The child handle itself lives in
/// the exit monitor task — the state tracks the pid and a generation
/// counter so a stale monitor from a previous worker cannot clobber the
/// state of the next one.
#[derive(Debug, Default)]
pub struct CoreState {
    /// True between a successful launch and the observed exit.
    pub running: bool,
    /// Identifier of the tracked worker. `running` implies `Some`.
    pub pid: Option<u32>,
    /// Active PID marker file, `None` when no marker is on disk.
    pub pid_path: Option<PathBuf>,
    /// Launch counter; each successful launch bumps it and the spawned
    /// monitor only cleans up if its generation still matches.
    pub generation: u64,
}

impl CoreState {
    /// Reset to the not-running state, returning the marker path that
    /// needs removal, if any.
    pub fn clear(&mut self) -> Option<PathBuf> {
        self.running = false;
        self.pid = None;
        self.pid_path.take()
    }
}

/// Caller-supplied options for a single launch, immutable per call.
#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    /// Environment overrides applied on top of the inherited
    /// environment; overrides win on key collision.
    pub env: HashMap<String, String>,
    /// Logical path of the mirror log file. Truncated at launch.
    pub log_file: Option<String>,
    /// Logical path of the PID marker file.
    pub pid_file: Option<String>,
    /// Substring whose appearance in output signals readiness.
    pub ready_keyword: Option<String>,
}

impl LaunchOptions {
    /// Start from empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an environment override.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Mirror output to the given logical log file path.
    #[must_use]
    pub fn log_file(mut self, logical: impl Into<String>) -> Self {
        self.log_file = Some(logical.into());
        self
    }

    /// Persist the worker pid to the given logical marker path.
    #[must_use]
    pub fn pid_file(mut self, logical: impl Into<String>) -> Self {
        self.pid_file = Some(logical.into());
        self
    }

    /// Fire a readiness notification when output contains `keyword`.
    #[must_use]
    pub fn ready_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.ready_keyword = Some(keyword.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_resets_and_returns_marker() {
        let mut state = CoreState {
            running: true,
            pid: Some(42),
            pid_path: Some(PathBuf::from("/tmp/core.pid")),
            generation: 3,
        };

        let marker = state.clear();
        assert_eq!(marker, Some(PathBuf::from("/tmp/core.pid")));
        assert!(!state.running);
        assert!(state.pid.is_none());
        assert!(state.pid_path.is_none());
        // Generation is untouched by clear.
        assert_eq!(state.generation, 3);
    }

    #[test]
    fn test_options_builder() {
        let options = LaunchOptions::new()
            .env("RUST_LOG", "debug")
            .log_file("logs/core.log")
            .pid_file("core.pid")
            .ready_keyword("READY");

        assert_eq!(options.env.get("RUST_LOG").map(String::as_str), Some("debug"));
        assert_eq!(options.log_file.as_deref(), Some("logs/core.log"));
        assert_eq!(options.pid_file.as_deref(), Some("core.pid"));
        assert_eq!(options.ready_keyword.as_deref(), Some("READY"));
    }
}
