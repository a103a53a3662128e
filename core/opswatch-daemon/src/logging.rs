//! Tracing setup for the `opswatch` binary.
//!
//! Everything goes to stderr. When a log directory is configured a second,
//! non-blocking layer writes a daily rolling file there; the returned guard
//! must live until the process exits or buffered lines are lost.

use std::env;
use std::path::Path;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

const DEBUG_ENV: &str = "OPSWATCH_DEBUG_LOG";
const LOG_FILE_PREFIX: &str = "opswatch";
const LOG_FILE_SUFFIX: &str = "log";

pub fn init(directory: Option<&Path>) -> Option<WorkerGuard> {
    let stderr = fmt::layer().with_writer(std::io::stderr);

    match directory.and_then(file_writer) {
        Some((writer, guard)) => {
            tracing_subscriber::registry()
                .with(env_filter())
                .with(stderr)
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(env_filter())
                .with(stderr)
                .init();
            None
        }
    }
}

fn env_filter() -> EnvFilter {
    let debug_forced = env::var(DEBUG_ENV)
        .map(|value| is_truthy(&value))
        .unwrap_or(false);
    if debug_forced {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value, "1" | "true" | "TRUE" | "yes" | "YES")
}

// Logging is not set up yet, so failures here can only go to stderr.
fn file_writer(directory: &Path) -> Option<(NonBlocking, WorkerGuard)> {
    if let Err(err) = fs_err::create_dir_all(directory) {
        eprintln!("opswatch: log directory unavailable, logging to stderr only: {}", err);
        return None;
    }

    match RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix(LOG_FILE_SUFFIX)
        .build(directory)
    {
        Ok(appender) => Some(tracing_appender::non_blocking(appender)),
        Err(err) => {
            eprintln!("opswatch: failed to open log file, logging to stderr only: {}", err);
            None
        }
    }
}
