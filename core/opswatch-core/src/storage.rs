//! Storage paths for opswatch.
//!
//! Every on-disk location is derived from a single root so tests can point the
//! whole engine at a temp directory with [`StorageConfig::with_root`].

use std::path::{Path, PathBuf};

use crate::error::{Result, WatchError};

/// Central configuration for all opswatch storage paths.
///
/// Production code uses [`StorageConfig::from_home`] which points to `~/.opswatch/`.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    root: PathBuf,
}

impl StorageConfig {
    pub fn from_home() -> Result<Self> {
        let home = dirs::home_dir().ok_or(WatchError::HomeNotFound)?;
        Ok(Self {
            root: home.join(".opswatch"),
        })
    }

    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path to config.toml (poll cadence, API endpoints).
    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    /// Path to state.json (durable key-value entries such as read cursors).
    pub fn state_file(&self) -> PathBuf {
        self.root.join("state.json")
    }

    /// Default directory for rolling log files.
    pub fn log_dir(&self) -> PathBuf {
        self.root.join("logs")
    }
}
