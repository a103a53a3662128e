//! Error types for opswatch-core operations.
//!
//! None of these are fatal to the engine: fetch errors skip a source for one
//! cycle and storage errors degrade to defaults. They exist so callers can log
//! them with context.

use std::path::PathBuf;

use opswatch_protocol::{ErrorInfo, SourceTag};

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    // ─────────────────────────────────────────────────────────────────────
    // Source Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Request to {source_tag} feed failed: {details}")]
    Http {
        source_tag: SourceTag,
        details: String,
    },

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),

    #[error("{source_tag} feed returned HTTP {status}")]
    HttpStatus { source_tag: SourceTag, status: u16 },

    #[error("{source_tag} feed payload rejected: {info}")]
    Decode {
        source_tag: SourceTag,
        info: ErrorInfo,
    },

    #[error("{source_tag} adapter panicked during fetch")]
    AdapterPanicked { source_tag: SourceTag },

    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Home directory not found")]
    HomeNotFound,

    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    // ─────────────────────────────────────────────────────────────────────
    // Storage Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Storage error: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, WatchError>;

impl From<WatchError> for String {
    fn from(err: WatchError) -> String {
        err.to_string()
    }
}
