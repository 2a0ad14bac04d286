//! `roll stream` - copy stdin into rotated files.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, ValueEnum};
use roll_artifacts::{DirLayout, FileFactory, FileNamer, SuffixScheme};
use roll_engine::{RollingSink, RotationOptions};
use tokio::io::{AsyncBufReadExt, BufReader};

use super::{CmdError, CmdResult};

const DEFAULT_INTERVAL_SECS: u64 = 300;
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_BASENAME: &str = "roll.log";

#[derive(Args, Debug)]
pub struct StreamArgs {
    /// Rotate every N seconds regardless of traffic (0 disables)
    #[arg(short = 'd', long, default_value_t = DEFAULT_INTERVAL_SECS)]
    interval_secs: u64,

    /// Rotate after N seconds without input (0 disables)
    #[arg(short = 't', long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout_secs: u64,

    /// Rotate when a generation reaches N bytes (0 disables)
    #[arg(short = 's', long, default_value_t = 0)]
    max_size: u64,

    /// Rotate when a generation holds N lines (0 disables)
    #[arg(short = 'c', long, default_value_t = 0)]
    max_count: u64,

    /// Directory layout for generation files
    #[arg(short = 'y', long, value_enum, default_value = "flat")]
    layout: LayoutArg,

    /// Filename suffix scheme
    #[arg(short = 'm', long, value_enum, default_value = "unix")]
    suffix: SuffixArg,

    /// Basename of generation files
    #[arg(short = 'b', long, default_value = DEFAULT_BASENAME)]
    basename: String,

    /// Ring size for the seq suffix: keep at most N files (0 = unbounded)
    #[arg(short = 'k', long, default_value_t = 0)]
    keep: u32,

    /// Keep zero-byte generations instead of deleting them
    #[arg(short = 'e', long)]
    keep_empty: bool,

    /// Copy stdin to stdout as well
    #[arg(long)]
    tee: bool,

    /// Directory receiving generation files
    datadir: PathBuf,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum LayoutArg {
    /// All files directly in the datadir
    Flat,
    /// YYYY/DDD/HH/ subdirectories
    Time,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum SuffixArg {
    /// <basename>-<unix seconds>
    Unix,
    /// <basename>-HHMMSS
    Hms,
    /// <basename>.NNNNNN, ring-bounded with --keep
    Seq,
}

pub async fn run(args: StreamArgs) -> CmdResult {
    let mut options = RotationOptions::default()
        .with_max_size(args.max_size)
        .with_max_count(args.max_count)
        .with_keep_empty(args.keep_empty);
    if args.interval_secs > 0 {
        options = options.with_interval(Duration::from_secs(args.interval_secs));
    }
    if args.timeout_secs > 0 {
        options = options.with_timeout(Duration::from_secs(args.timeout_secs));
    }

    let layout = match args.layout {
        LayoutArg::Flat => DirLayout::Flat,
        LayoutArg::Time => DirLayout::TimeBuckets,
    };
    let suffix = match args.suffix {
        SuffixArg::Unix => SuffixScheme::UnixStamp,
        SuffixArg::Hms => SuffixScheme::ClockTime,
        SuffixArg::Seq => SuffixScheme::Sequence {
            ring: (args.keep > 0).then_some(args.keep),
        },
    };
    let namer = FileNamer::new(&args.basename)
        .with_layout(layout)
        .with_suffix(suffix);

    let factory = FileFactory::new(&args.datadir, namer).map_err(CmdError::setup)?;
    let sink = RollingSink::open(factory, options).map_err(CmdError::setup)?;
    tracing::info!(datadir = %args.datadir.display(), "streaming stdin");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut failure: Option<CmdError> = None;
    let mut line_no: u64 = 1;
    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!("interrupted, shutting down");
                break;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if args.tee {
                        println!("{line}");
                    }
                    let record = format!("{line_no}: {line}\n");
                    if let Err(e) = sink.write(record.as_bytes()).await {
                        failure = Some(CmdError::runtime(e));
                        break;
                    }
                    line_no += 1;
                }
                Ok(None) => break,
                Err(e) => {
                    failure = Some(CmdError::runtime(e));
                    break;
                }
            }
        }
    }

    let close_result = sink.close().await;
    let snapshot = sink.metrics().snapshot();
    tracing::info!(
        lines = snapshot.records_written,
        bytes = snapshot.bytes_written,
        rotations = snapshot.rotations,
        "stream finished"
    );

    if let Some(failure) = failure {
        return Err(failure);
    }
    close_result.map_err(CmdError::runtime)
}
