//! Plain append-file artifacts.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use roll_engine::{Artifact, ArtifactWrite, NextFactory};

use crate::naming::FileNamer;

/// Default write buffer in front of each generation file.
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Produces buffered append-mode files named by a [`FileNamer`].
#[derive(Debug, Clone)]
pub struct FileFactory {
    datadir: PathBuf,
    namer: FileNamer,
    buffer_size: usize,
}

impl FileFactory {
    /// `datadir` must already exist; generation subdirectories are
    /// created on demand.
    pub fn new(datadir: impl Into<PathBuf>, namer: FileNamer) -> io::Result<Self> {
        let datadir = datadir.into();
        if !datadir.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("datadir {} is not a directory", datadir.display()),
            ));
        }
        Ok(Self {
            datadir,
            namer,
            buffer_size: DEFAULT_BUFFER_SIZE,
        })
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }
}

impl NextFactory for FileFactory {
    fn create(&mut self, generation: u64, stamp: DateTime<Utc>) -> io::Result<Artifact> {
        let path = self.datadir.join(self.namer.relative_path(generation, stamp));
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::options().create(true).append(true).open(&path)?;
        tracing::debug!(generation, path = %path.display(), "opened generation file");

        let chain = FileChain {
            writer: BufWriter::with_capacity(self.buffer_size, file),
        };
        Ok(Artifact::new(Box::new(chain)).with_path(path))
    }
}

struct FileChain {
    writer: BufWriter<File>,
}

impl Write for FileChain {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl ArtifactWrite for FileChain {
    fn flush_all(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    fn finish(mut self: Box<Self>) -> io::Result<()> {
        self.writer.flush()
    }
}

#[cfg(test)]
#[path = "file_test.rs"]
mod file_test;
