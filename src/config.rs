//! Application configuration.
//!
//! A small TOML file controls supervisor behavior that is decided by the
//! hosting application rather than per launch, most importantly whether
//! the worker is taken down when the host exits.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Supervisor-wide configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Kill the worker when the hosting application shuts down.
    ///
    /// When false, the worker is deliberately left running across host
    /// restarts and reaped on the next launch via the PID marker.
    pub exit_core_on_shutdown: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            exit_core_on_shutdown: true,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file, or return defaults when the
    /// file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },
}
