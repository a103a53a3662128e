//! opswatch: change notifications for the ISP operations dashboard.
//!
//! Polls the operator activity feed, the CPE device fleet and the router's
//! PPPoE session table, and reports status changes as notifications.
//!
//! ## Subcommands
//!
//! - `run`: Poll on an interval until `q` or end of stdin
//! - `poll-once`: Prime, poll once, print the notification list as JSON
//! - `mark-read`: Persist the read cursor at "now"
//! - `status`: Print the persisted read cursor

mod commands;
mod context;
mod logging;
mod run;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::context::Context;

#[derive(Parser)]
#[command(name = "opswatch")]
#[command(about = "Change notifications for the ISP operations dashboard")]
#[command(version)]
struct Cli {
    /// Config file (defaults to ~/.opswatch/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Operator profile whose read cursor is used
    #[arg(long, global = true, value_name = "NAME")]
    profile: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll continuously (stdin: r = mark all read, p = poll now, q = quit)
    Run {
        /// Seconds between the end of one cycle and the start of the next
        #[arg(long, value_name = "SECS")]
        interval_secs: Option<u64>,
    },

    /// Prime every source, poll once, and print the list as JSON
    PollOnce,

    /// Mark every notification up to now as read
    MarkRead,

    /// Print the persisted read cursor
    Status,
}

fn main() {
    let cli = Cli::parse();

    let context = match Context::load(cli.config.as_deref(), cli.profile.as_deref()) {
        Ok(context) => context,
        Err(err) => {
            let _logging_guard = logging::init(None);
            tracing::error!(error = %err, "Unusable configuration");
            std::process::exit(2);
        }
    };
    let _logging_guard = logging::init(context.log_dir());

    let result = match cli.command {
        Commands::Run { interval_secs } => run::run(&context, interval_secs),
        Commands::PollOnce => commands::poll_once(&context),
        Commands::MarkRead => commands::mark_read(&context),
        Commands::Status => commands::status(&context),
    };

    if let Err(err) = result {
        tracing::error!(error = %err, "opswatch failed");
        std::process::exit(1);
    }
}
