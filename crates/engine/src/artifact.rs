//! The artifact contract consumed by the rotation engine.
//!
//! An artifact is one physical output resource representing one generation:
//! a primary appendable writer plus the ordered chain of inner closers
//! stacked underneath it (e.g. tar over gzip over a raw file). The engine
//! never writes to inner layers directly; it closes them in reverse
//! construction order after the primary writer has been finished.
//!
//! Artifacts are produced by a [`NextFactory`]: a caller-supplied callback
//! that, given a generation number and a rotation stamp, materialises the
//! next artifact. The factory is invoked once at open and once per
//! rotation, and may fail.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

/// Header formats a framed artifact writer may speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Tar,
    Ar,
    Cpio,
}

impl ArchiveFormat {
    /// Conventional file extension for archives of this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Tar => ".tar",
            Self::Ar => ".ar",
            Self::Cpio => ".cpio",
        }
    }
}

/// Capability a primary writer declares: raw byte stream, or an archive
/// stream that frames records with typed headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Raw,
    Archive(ArchiveFormat),
}

/// Metadata emitted ahead of a record payload by archive writers.
///
/// Writers without archive capability ignore the header entirely.
#[derive(Debug, Clone, Default)]
pub struct RecordHeader {
    /// Entry name inside the archive.
    pub name: String,
    /// Payload size in bytes.
    pub size: u64,
    /// Unix permission bits.
    pub mode: u32,
    pub uid: u64,
    pub gid: u64,
    /// Modification time; `None` means "now" at frame time.
    pub mtime: Option<DateTime<Utc>>,
}

impl RecordHeader {
    /// Header for a named entry of the given size with common defaults.
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            mode: 0o644,
            ..Self::default()
        }
    }
}

/// The primary appendable byte sink of an artifact.
pub trait ArtifactWrite: Write + Send {
    /// Capability of this writer. Defaults to a raw byte stream.
    fn kind(&self) -> ArtifactKind {
        ArtifactKind::Raw
    }

    /// Write one framed record: header first, then the payload.
    ///
    /// Raw writers ignore the header and append the payload as-is. Returns
    /// the number of payload bytes written.
    fn write_record(&mut self, header: &RecordHeader, payload: &[u8]) -> io::Result<usize> {
        let _ = header;
        self.write_all(payload)?;
        Ok(payload.len())
    }

    /// Push buffered data down to the underlying resource.
    fn flush_all(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// Consume the writer, finalising any trailer it owes the stream.
    fn finish(self: Box<Self>) -> io::Result<()>;
}

/// One layer underneath the primary writer, closable exactly once.
pub trait InnerClose: Send {
    fn close(self: Box<Self>) -> io::Result<()>;
}

/// Produces the artifact for a generation.
///
/// Must be pure with respect to its two arguments, but may perform I/O
/// (create directories, open files) and may fail. A failure at open aborts
/// construction; a failure on rotation becomes a sticky fault on the sink.
pub trait NextFactory: Send + 'static {
    fn create(&mut self, generation: u64, stamp: DateTime<Utc>) -> io::Result<Artifact>;
}

impl<F> NextFactory for F
where
    F: FnMut(u64, DateTime<Utc>) -> io::Result<Artifact> + Send + 'static,
{
    fn create(&mut self, generation: u64, stamp: DateTime<Utc>) -> io::Result<Artifact> {
        self(generation, stamp)
    }
}

/// A single open output resource: primary writer, inner closer chain, and
/// the on-disk path if the artifact has one (used by the empty-drop
/// policy).
pub struct Artifact {
    writer: Box<dyn ArtifactWrite>,
    closers: Vec<Box<dyn InnerClose>>,
    path: Option<PathBuf>,
}

impl Artifact {
    pub fn new(writer: Box<dyn ArtifactWrite>) -> Self {
        Self {
            writer,
            closers: Vec::new(),
            path: None,
        }
    }

    /// Attach inner closers, listed in construction order (outermost
    /// layer last is not required; closing walks the list in reverse).
    pub fn with_closers(mut self, closers: Vec<Box<dyn InnerClose>>) -> Self {
        self.closers = closers;
        self
    }

    /// Record where the artifact lives on disk.
    pub fn with_path(mut self, path: PathBuf) -> Self {
        self.path = Some(path);
        self
    }

    pub fn kind(&self) -> ArtifactKind {
        self.writer.kind()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The primary writer. Everything the sink appends goes through here.
    pub fn writer_mut(&mut self) -> &mut dyn ArtifactWrite {
        &mut *self.writer
    }

    /// Flush and finish the primary writer, then close the inner layers in
    /// reverse construction order. The first error is returned; later
    /// errors are logged but do not halt the remaining closers.
    pub fn close(self) -> io::Result<()> {
        let Self {
            writer, closers, ..
        } = self;
        let mut first: Option<io::Error> = None;

        let mut writer = writer;
        if let Err(e) = writer.flush_all() {
            first = Some(e);
        }
        if let Err(e) = writer.finish() {
            if first.is_none() {
                first = Some(e);
            } else {
                tracing::warn!(error = %e, "primary writer finish failed after flush error");
            }
        }

        for closer in closers.into_iter().rev() {
            if let Err(e) = closer.close() {
                if first.is_none() {
                    first = Some(e);
                } else {
                    tracing::warn!(error = %e, "inner closer failed after earlier close error");
                }
            }
        }

        match first {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
#[path = "artifact_test.rs"]
mod artifact_test;
