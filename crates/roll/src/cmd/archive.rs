//! `roll archive` - pack a directory tree into rotated tar archives.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use clap::Args;
use roll_artifacts::{FileNamer, SuffixScheme, TarFactory};
use roll_engine::{RecordHeader, RollingSink, RotationOptions};
use walkdir::WalkDir;

use super::{CmdError, CmdResult};

#[derive(Args, Debug)]
pub struct ArchiveArgs {
    /// Directory receiving the archives
    #[arg(short = 'o', long, default_value = ".")]
    datadir: PathBuf,

    /// Archive name prefix
    #[arg(short = 'p', long, default_value = "roll")]
    prefix: String,

    /// Gzip-compress each archive
    #[arg(short = 'z', long)]
    gzip: bool,

    /// Start a new archive after N payload bytes (0 disables)
    #[arg(short = 's', long, default_value_t = 0)]
    max_size: u64,

    /// Start a new archive after N files (0 disables)
    #[arg(short = 'c', long, default_value_t = 0)]
    max_count: u64,

    /// Owner recorded in the archive entries
    #[arg(short = 'u', long, default_value_t = 1000)]
    uid: u64,

    /// Group recorded in the archive entries
    #[arg(short = 'g', long, default_value_t = 1000)]
    gid: u64,

    /// Directory tree to pack
    input: PathBuf,
}

pub async fn run(args: ArchiveArgs) -> CmdResult {
    std::fs::create_dir_all(&args.datadir).map_err(CmdError::setup)?;

    let namer = FileNamer::new(&args.prefix)
        .with_suffix(SuffixScheme::SequenceStamp)
        .with_extension(if args.gzip { ".tar.gz" } else { ".tar" });
    let factory = TarFactory::new(&args.datadir, namer)
        .map_err(CmdError::setup)?
        .with_gzip(args.gzip);

    let options = RotationOptions::default()
        .with_max_size(args.max_size)
        .with_max_count(args.max_count);
    let sink = RollingSink::open(factory, options).map_err(CmdError::setup)?;

    let mut walk_failure: Option<CmdError> = None;
    let mut packed: u64 = 0;
    for entry in WalkDir::new(&args.input) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                walk_failure = Some(CmdError::runtime(e));
                break;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let result = pack_file(&sink, entry.path(), args.uid, args.gid).await;
        if let Err(e) = result {
            walk_failure = Some(e);
            break;
        }
        packed += 1;
    }

    let close_result = sink.close().await;
    let snapshot = sink.metrics().snapshot();
    tracing::info!(
        files = packed,
        bytes = snapshot.bytes_written,
        archives = snapshot.rotations + 1,
        "archive finished"
    );

    if let Some(failure) = walk_failure {
        return Err(failure);
    }
    close_result.map_err(CmdError::runtime)
}

async fn pack_file(sink: &RollingSink, path: &Path, uid: u64, gid: u64) -> CmdResult {
    let data = std::fs::read(path).map_err(CmdError::runtime)?;
    let metadata = std::fs::metadata(path).map_err(CmdError::runtime)?;

    let header = RecordHeader {
        name: path.to_string_lossy().into_owned(),
        size: data.len() as u64,
        mode: entry_mode(&metadata),
        uid,
        gid,
        mtime: metadata.modified().ok().map(DateTime::<Utc>::from),
    };

    sink.write_record(&header, &data)
        .await
        .map_err(CmdError::runtime)?;
    tracing::debug!(path = %path.display(), bytes = data.len(), "packed file");
    Ok(())
}

#[cfg(unix)]
fn entry_mode(metadata: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn entry_mode(_metadata: &std::fs::Metadata) -> u32 {
    0o644
}
