//! roll - rotate an unbounded byte stream into generation files
//!
//! # Usage
//!
//! ```bash
//! # stdin -> rotated files under ./logs, new file every 5 minutes
//! roll stream logs
//!
//! # size-capped, time-bucketed directories
//! roll stream -s 1048576 -y time logs
//!
//! # pack a directory tree into rotated gzip tarballs, 50 files each
//! roll archive -z -c 50 -o backups ./data
//!
//! # replay a sample file to stdout, one line per 100ms
//! roll feed -e 100 sample.log | roll stream logs
//! ```

mod cmd;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Rotate an unbounded byte stream into generation files and archives.
#[derive(Parser, Debug)]
#[command(name = "roll")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Copy stdin into rotated files under a data directory
    Stream(cmd::stream::StreamArgs),

    /// Pack a directory tree into rotated tar archives
    Archive(cmd::archive::ArchiveArgs),

    /// Replay a file to stdout at a fixed cadence
    Feed(cmd::feed::FeedArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(&cli.log_level) {
        eprintln!("roll: {e}");
        return ExitCode::from(cmd::SETUP_FAILURE);
    }

    let result = match cli.command {
        Command::Stream(args) => cmd::stream::run(args).await,
        Command::Archive(args) => cmd::archive::run(args).await,
        Command::Feed(args) => cmd::feed::run(args).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let chain = format!("{:#}", e.source);
            tracing::error!(error = %chain, "command failed");
            ExitCode::from(e.code)
        }
    }
}

/// Initialize the tracing subscriber for logging
fn init_logging(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(filter)
        .init();

    Ok(())
}
