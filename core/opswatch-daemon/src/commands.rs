//! One-shot subcommands: `poll-once`, `mark-read`, `status`.

use chrono::{DateTime, SecondsFormat, Utc};
use opswatch_core::{CycleOutcome, ReadCursor, Result, WatchError};
use serde_json::json;
use tracing::{info, warn};

use crate::context::Context;

/// Priming pass plus one regular cycle; prints the resulting list as JSON.
pub fn poll_once(context: &Context) -> Result<()> {
    let engine = context.engine()?;
    engine.prime();

    match engine.run_cycle() {
        CycleOutcome::Completed(report) => {
            if !report.failed.is_empty() {
                warn!(failed = ?report.failed, "Some sources could not be reached");
            }
            info!(
                listed = engine.notifications().len(),
                unread = report.unread,
                "Poll finished"
            );
        }
        CycleOutcome::Skipped => warn!("Poll cycle skipped"),
    }

    let items = engine.notifications();
    let rendered =
        serde_json::to_string_pretty(items.as_slice()).map_err(|source| WatchError::Json {
            context: "Failed to serialize notifications".to_string(),
            source,
        })?;
    println!("{}", rendered);
    Ok(())
}

pub fn mark_read(context: &Context) -> Result<()> {
    let cursor = ReadCursor::load(context.store(), &context.config.profile);
    let value = cursor.mark_all_read(Utc::now())?;
    info!(
        profile = %context.config.profile,
        cursor = %value.to_rfc3339(),
        "Marked all notifications read"
    );
    println!("{}", render_status(&context.config.profile, value));
    Ok(())
}

pub fn status(context: &Context) -> Result<()> {
    let cursor = ReadCursor::load(context.store(), &context.config.profile);
    println!("{}", render_status(&context.config.profile, cursor.value()));
    Ok(())
}

fn render_status(profile: &str, cursor: DateTime<Utc>) -> String {
    json!({
        "profile": profile,
        "readCursor": cursor.to_rfc3339_opts(SecondsFormat::AutoSi, true),
    })
    .to_string()
}
