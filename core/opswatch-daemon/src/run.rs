//! `opswatch run`: the long-lived poll loop.
//!
//! The scheduler polls in the background while the main thread reads one
//! command per stdin line. A reporter thread logs each notification the first
//! time it shows up in the list.

use opswatch_core::{FeedUpdate, NotificationEngine, PollScheduler, Result, WatchError};
use std::collections::HashSet;
use std::io::{self, BufRead};
use std::sync::{mpsc, Arc};
use std::thread;
use tracing::{debug, info, warn};

use crate::context::Context;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    MarkRead,
    Poll,
    Quit,
}

pub fn parse_command(line: &str) -> Option<Command> {
    match line.trim() {
        "r" | "read" => Some(Command::MarkRead),
        "p" | "poll" => Some(Command::Poll),
        "q" | "quit" => Some(Command::Quit),
        _ => None,
    }
}

pub fn run(context: &Context, interval_secs: Option<u64>) -> Result<()> {
    let engine = Arc::new(context.engine()?);
    let updates = engine.subscribe();
    let reporter = thread::Builder::new()
        .name("opswatch-reporter".to_string())
        .spawn(move || report_notifications(updates))
        .map_err(|source| WatchError::Io {
            context: "Failed to spawn reporter thread".to_string(),
            source,
        })?;

    let interval = context.interval(interval_secs);
    info!(
        profile = %context.config.profile,
        interval_secs = interval.as_secs(),
        state = %context.state_file().display(),
        "opswatch running; commands: r = mark all read, p = poll now, q = quit"
    );

    let scheduler = PollScheduler::new(Arc::clone(&engine), interval);
    scheduler.start();
    drive(io::stdin().lock(), &engine, &scheduler);
    scheduler.stop();

    // The reporter exits once the last engine handle (and its senders) is gone.
    drop(scheduler);
    drop(engine);
    if reporter.join().is_err() {
        warn!("Reporter thread panicked");
    }
    Ok(())
}

/// Handles stdin commands until `q` or end of input.
pub fn drive<R: BufRead>(input: R, engine: &NotificationEngine, scheduler: &PollScheduler) {
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                warn!(error = %err, "Failed to read command; stopping");
                break;
            }
        };

        match parse_command(&line) {
            Some(Command::MarkRead) => {
                if let Err(err) = engine.mark_all_read() {
                    warn!(error = %err, "Read cursor not persisted; it will reset on restart");
                }
            }
            Some(Command::Poll) => scheduler.trigger(),
            Some(Command::Quit) => break,
            None if line.trim().is_empty() => {}
            None => warn!(input = %line.trim(), "Unknown command; expected r, p or q"),
        }
    }
    debug!("Command input closed");
}

fn report_notifications(updates: mpsc::Receiver<FeedUpdate>) {
    let mut listed: HashSet<String> = HashSet::new();
    for update in updates {
        for item in update.items.iter().filter(|item| !listed.contains(&item.id)) {
            info!(
                source = %item.source,
                severity = %item.severity,
                title = %item.title,
                description = item.description.as_deref().unwrap_or(""),
                "Notification"
            );
        }
        listed = update.items.iter().map(|item| item.id.clone()).collect();
        info!(unread = update.unread, "Unread notifications");
    }
}
