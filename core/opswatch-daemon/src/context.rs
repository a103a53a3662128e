//! Resolved configuration shared by every subcommand.

use opswatch_core::{
    http_adapters, load_config, DurableKeyValueStore, FileKeyValueStore, NotificationEngine,
    Result, StorageConfig, WatchConfig,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub struct Context {
    pub config: WatchConfig,
    pub storage: StorageConfig,
}

impl Context {
    /// Loads `~/.opswatch/config.toml` (or `config_path`) and applies
    /// command-line overrides.
    pub fn load(config_path: Option<&Path>, profile: Option<&str>) -> Result<Self> {
        Self::with_storage(StorageConfig::from_home()?, config_path, profile)
    }

    pub fn with_storage(
        storage: StorageConfig,
        config_path: Option<&Path>,
        profile: Option<&str>,
    ) -> Result<Self> {
        let path = config_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| storage.config_file());
        let mut config = load_config(&path)?;

        if let Some(profile) = profile.map(str::trim).filter(|value| !value.is_empty()) {
            config.profile = profile.to_string();
        }
        debug!(
            config = %path.display(),
            profile = %config.profile,
            "Configuration loaded"
        );
        Ok(Self { config, storage })
    }

    pub fn log_dir(&self) -> Option<&Path> {
        self.config.logging.directory.as_deref()
    }

    pub fn state_file(&self) -> PathBuf {
        self.storage.state_file()
    }

    pub fn store(&self) -> Arc<dyn DurableKeyValueStore> {
        Arc::new(FileKeyValueStore::new(&self.state_file()))
    }

    /// `--interval-secs` wins over the config file; both are clamped to 1s.
    pub fn interval(&self, override_secs: Option<u64>) -> Duration {
        let mut poll = self.config.poll.clone();
        if let Some(secs) = override_secs {
            poll.interval_secs = secs;
        }
        poll.interval()
    }

    pub fn engine(&self) -> Result<NotificationEngine> {
        let adapters = http_adapters(&self.config.api, &self.config.poll)?;
        Ok(
            NotificationEngine::new(adapters, self.store(), &self.config.profile)
                .with_capacity(self.config.poll.capacity),
        )
    }
}
