//! Durable key-value storage.
//!
//! The engine persists exactly one thing (the read cursor per profile), so the
//! store is a flat string map. [`FileKeyValueStore`] keeps it in a single JSON
//! file written with temp file + rename; [`InMemoryKeyValueStore`] backs tests.
//!
//! # File Format
//!
//! ```json
//! {
//!   "version": 1,
//!   "entries": {
//!     "notifications.read_cursor.default": "2026-01-30T12:00:00+00:00"
//!   }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::NamedTempFile;
use tracing::warn;

use crate::error::{Result, WatchError};

const STORE_VERSION: u32 = 1;

pub trait DurableKeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Must not return before the value is durable.
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    #[serde(default)]
    entries: BTreeMap<String, String>,
}

impl Default for StoreFile {
    fn default() -> Self {
        Self {
            version: STORE_VERSION,
            entries: BTreeMap::new(),
        }
    }
}

/// JSON-file backed store. Reads go to disk every time so two processes
/// sharing a profile (e.g. `opswatch mark-read` next to `opswatch run`)
/// observe each other's writes.
pub struct FileKeyValueStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl FileKeyValueStore {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<StoreFile> {
        let content = match fs_err::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(StoreFile::default())
            }
            Err(source) => {
                return Err(WatchError::Io {
                    context: "Failed to read state file".to_string(),
                    source,
                })
            }
        };

        if content.trim().is_empty() {
            return Ok(StoreFile::default());
        }

        match serde_json::from_str::<StoreFile>(&content) {
            Ok(file) if file.version == STORE_VERSION => Ok(file),
            Ok(file) => {
                warn!(
                    version = file.version,
                    path = %self.path.display(),
                    "Unsupported state file version; treating as empty"
                );
                Ok(StoreFile::default())
            }
            Err(err) => {
                warn!(
                    error = %err,
                    path = %self.path.display(),
                    "Corrupt state file; treating as empty"
                );
                Ok(StoreFile::default())
            }
        }
    }

    fn save(&self, file: &StoreFile) -> Result<()> {
        let parent_dir = self
            .path
            .parent()
            .ok_or_else(|| WatchError::Storage("State file path has no parent".to_string()))?;
        fs_err::create_dir_all(parent_dir).map_err(|source| WatchError::Io {
            context: "Failed to create state directory".to_string(),
            source,
        })?;

        let content = serde_json::to_string_pretty(file).map_err(|source| WatchError::Json {
            context: "Failed to serialize state file".to_string(),
            source,
        })?;

        let mut temp_file = NamedTempFile::new_in(parent_dir).map_err(|source| WatchError::Io {
            context: "Failed to create temp state file".to_string(),
            source,
        })?;
        temp_file
            .write_all(content.as_bytes())
            .map_err(|source| WatchError::Io {
                context: "Failed to write temp state file".to_string(),
                source,
            })?;
        temp_file
            .as_file()
            .sync_all()
            .map_err(|source| WatchError::Io {
                context: "Failed to sync temp state file".to_string(),
                source,
            })?;
        temp_file
            .persist(&self.path)
            .map_err(|err| WatchError::Io {
                context: "Failed to commit state file".to_string(),
                source: err.error,
            })?;
        Ok(())
    }
}

impl DurableKeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.load()?.entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut file = self.load()?;
        file.entries.insert(key.to_string(), value.to_string());
        self.save(&file)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryKeyValueStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DurableKeyValueStore for InMemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}
