//! Tar archive artifacts, optionally gzip-wrapped.
//!
//! The streaming factory builds `tar -> gzip -> file` with each layer
//! registered as an inner closer; the engine finishes the tar trailer
//! through the primary writer, then the gzip frame, then the file, in
//! that order. [`TarFramer`] covers the staged variant, where whole
//! archives are assembled in memory and written in one pass.

use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;

use bytes::BytesMut;
use chrono::{DateTime, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use roll_engine::{
    ArchiveFormat, Artifact, ArtifactKind, ArtifactWrite, InnerClose, NextFactory, RecordFramer,
    RecordHeader,
};

use crate::naming::FileNamer;
use crate::stack::Stacked;

const TAR_BLOCK: usize = 512;
const ZERO_BLOCK: [u8; TAR_BLOCK] = [0u8; TAR_BLOCK];

/// Produces tar archives named by a [`FileNamer`].
#[derive(Debug, Clone)]
pub struct TarFactory {
    datadir: PathBuf,
    namer: FileNamer,
    gzip: bool,
}

impl TarFactory {
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
            gzip: false,
        })
    }

    pub fn with_gzip(mut self, gzip: bool) -> Self {
        self.gzip = gzip;
        self
    }
}

impl NextFactory for TarFactory {
    fn create(&mut self, generation: u64, stamp: DateTime<Utc>) -> io::Result<Artifact> {
        let path = self.datadir.join(self.namer.relative_path(generation, stamp));
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = Stacked::new(File::create(&path)?);
        tracing::debug!(generation, path = %path.display(), gzip = self.gzip, "opened archive");

        let mut closers: Vec<Box<dyn InnerClose>> = Vec::new();
        closers.push(file.closer(|file: File| {
            drop(file);
            Ok(())
        }));

        let builder = if self.gzip {
            let gz = Stacked::new(GzEncoder::new(file.clone(), Compression::default()));
            closers.push(gz.closer(|encoder| encoder.finish().map(drop)));
            tar::Builder::new(Box::new(gz) as Box<dyn Write + Send>)
        } else {
            tar::Builder::new(Box::new(file) as Box<dyn Write + Send>)
        };

        Ok(Artifact::new(Box::new(TarChain { builder }))
            .with_closers(closers)
            .with_path(path))
    }
}

struct TarChain {
    builder: tar::Builder<Box<dyn Write + Send>>,
}

impl Write for TarChain {
    /// Raw writes bypass the record framing and land directly on the
    /// archive stream.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.builder.get_mut().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.builder.get_mut().flush()
    }
}

impl ArtifactWrite for TarChain {
    fn kind(&self) -> ArtifactKind {
        ArtifactKind::Archive(ArchiveFormat::Tar)
    }

    fn write_record(&mut self, header: &RecordHeader, payload: &[u8]) -> io::Result<usize> {
        let mut entry = tar_header(header, payload.len() as u64);
        self.builder.append_data(&mut entry, &header.name, payload)?;
        Ok(payload.len())
    }

    fn flush_all(&mut self) -> io::Result<()> {
        self.builder.get_mut().flush()
    }

    fn finish(mut self: Box<Self>) -> io::Result<()> {
        self.builder.finish()
    }
}

/// Frames records as tar entries into a staging buffer, for archives
/// assembled in memory and written in one pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct TarFramer;

impl RecordFramer for TarFramer {
    fn frame(
        &mut self,
        header: &RecordHeader,
        payload: &[u8],
        out: &mut BytesMut,
    ) -> io::Result<()> {
        let mut entry = tar_header(header, payload.len() as u64);
        entry.set_path(&header.name)?;
        entry.set_cksum();

        out.extend_from_slice(entry.as_bytes());
        out.extend_from_slice(payload);
        let tail = payload.len() % TAR_BLOCK;
        if tail != 0 {
            out.extend_from_slice(&ZERO_BLOCK[tail..]);
        }
        Ok(())
    }

    /// The tar end-of-archive marker: two zero blocks.
    fn finish(&mut self, out: &mut BytesMut) -> io::Result<()> {
        out.extend_from_slice(&ZERO_BLOCK);
        out.extend_from_slice(&ZERO_BLOCK);
        Ok(())
    }
}

fn tar_header(header: &RecordHeader, size: u64) -> tar::Header {
    let mut entry = tar::Header::new_gnu();
    entry.set_size(size);
    entry.set_mode(header.mode);
    entry.set_uid(header.uid);
    entry.set_gid(header.gid);
    let mtime = header.mtime.unwrap_or_else(Utc::now);
    entry.set_mtime(mtime.timestamp().max(0) as u64);
    entry.set_entry_type(tar::EntryType::Regular);
    entry
}

#[cfg(test)]
#[path = "archive_test.rs"]
mod archive_test;
