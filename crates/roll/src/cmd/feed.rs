//! `roll feed` - replay a file to stdout at a fixed cadence.
//!
//! The companion traffic generator: feeds the other subcommands a steady
//! line rate so rotation behaviour can be watched in real time.

use std::fmt::Write as _;
use std::path::PathBuf;
use std::time::Duration;

use clap::Args;

use super::{CmdError, CmdResult};

#[derive(Args, Debug)]
pub struct FeedArgs {
    /// Milliseconds between emitted tokens
    #[arg(short = 'e', long, default_value_t = 1000)]
    every_ms: u64,

    /// Maximum token length in bytes
    #[arg(short = 'n', long, default_value_t = 80)]
    length: usize,

    /// Emit fixed-size hex-encoded chunks instead of lines
    #[arg(short = 'b', long)]
    binary: bool,

    /// Replay the file this many times (0 = forever)
    #[arg(short = 'r', long, default_value_t = 1)]
    repeat: u64,

    /// File to replay
    input: PathBuf,
}

pub async fn run(args: FeedArgs) -> CmdResult {
    let data = std::fs::read(&args.input).map_err(CmdError::setup)?;
    let tokens = if args.binary {
        hex_chunks(&data, args.length.max(1))
    } else {
        lines(&data, args.length.max(1))
    };
    if tokens.is_empty() {
        return Ok(());
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut ticker = tokio::time::interval(Duration::from_millis(args.every_ms.max(1)));

    let mut round: u64 = 0;
    'outer: while args.repeat == 0 || round < args.repeat {
        for token in &tokens {
            tokio::select! {
                _ = &mut ctrl_c => break 'outer,
                _ = ticker.tick() => println!("{token}"),
            }
        }
        round += 1;
    }
    Ok(())
}

/// Split into lines, wrapping any line longer than `length`.
fn lines(data: &[u8], length: usize) -> Vec<String> {
    let text = String::from_utf8_lossy(data);
    let mut tokens = Vec::new();
    for line in text.lines() {
        if line.len() <= length {
            tokens.push(line.to_string());
        } else {
            let mut rest = line;
            while rest.len() > length {
                let cut = floor_char_boundary(rest, length);
                tokens.push(rest[..cut].to_string());
                rest = &rest[cut..];
            }
            if !rest.is_empty() {
                tokens.push(rest.to_string());
            }
        }
    }
    tokens
}

/// Split into fixed-size chunks, hex-encoded one chunk per token.
fn hex_chunks(data: &[u8], length: usize) -> Vec<String> {
    data.chunks(length)
        .map(|chunk| {
            let mut token = String::with_capacity(chunk.len() * 2);
            for byte in chunk {
                let _ = write!(&mut token, "{byte:02x}");
            }
            token
        })
        .collect()
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    while index > 0 && !s.is_char_boundary(index) {
        index -= 1;
    }
    index.max(1)
}
