//! Runtime configuration loaded from `~/.opswatch/config.toml`.
//!
//! A missing file yields defaults; a present but malformed file is an error so
//! a typo never silently points the engine at localhost.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, WatchError};

pub const DEFAULT_PROFILE: &str = "default";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_CAPACITY: usize = 50;
pub const DEFAULT_ACTIVITY_LIMIT: usize = 20;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PollConfig {
    pub interval_secs: u64,
    pub capacity: usize,
    pub activity_limit: usize,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            capacity: DEFAULT_CAPACITY,
            activity_limit: DEFAULT_ACTIVITY_LIMIT,
        }
    }
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ApiConfig {
    pub dashboard_base_url: String,
    pub device_base_url: String,
    pub router_base_url: String,
    pub token: Option<String>,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            dashboard_base_url: "http://localhost:8080/api".to_string(),
            device_base_url: "http://localhost:7557".to_string(),
            router_base_url: "http://localhost:8080/api/router".to_string(),
            token: None,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    pub directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WatchConfig {
    /// Operator profile the read cursor is stored under.
    pub profile: String,
    pub poll: PollConfig,
    pub api: ApiConfig,
    pub logging: LoggingConfig,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            profile: DEFAULT_PROFILE.to_string(),
            poll: PollConfig::default(),
            api: ApiConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<WatchConfig> {
    if !path.exists() {
        return Ok(WatchConfig::default());
    }

    let content = fs_err::read_to_string(path).map_err(|source| WatchError::Io {
        context: format!("Failed to read config {}", path.display()),
        source,
    })?;
    let mut config =
        toml::from_str::<WatchConfig>(&content).map_err(|err| WatchError::ConfigMalformed {
            path: path.to_path_buf(),
            details: err.to_string(),
        })?;

    if config.profile.trim().is_empty() {
        config.profile = DEFAULT_PROFILE.to_string();
    }
    if config.poll.capacity == 0 {
        return Err(WatchError::ConfigMalformed {
            path: path.to_path_buf(),
            details: "poll.capacity must be at least 1".to_string(),
        });
    }
    Ok(config)
}
