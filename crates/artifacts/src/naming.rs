//! Generation naming: directory layouts and filename suffix schemes.
//!
//! The engine hands a factory only `(generation, stamp)`; everything
//! about where the artifact lands and what it is called lives here.

use std::io;
use std::path::PathBuf;

use chrono::{DateTime, Datelike, Timelike, Utc};
use roll_engine::StagePath;

/// Where generation files land relative to the data directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DirLayout {
    /// Everything directly under the data directory.
    #[default]
    Flat,
    /// `YYYY/DDD/HH/` subdirectories derived from the rotation stamp.
    TimeBuckets,
}

impl DirLayout {
    fn bucket(&self, stamp: DateTime<Utc>) -> PathBuf {
        match self {
            Self::Flat => PathBuf::new(),
            Self::TimeBuckets => PathBuf::from(format!(
                "{:04}/{:03}/{:02}",
                stamp.year(),
                stamp.ordinal(),
                stamp.hour()
            )),
        }
    }
}

/// How a generation file's name is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuffixScheme {
    /// `<base>-<unix seconds>`
    UnixStamp,
    /// `<base>-HHMMSS`
    ClockTime,
    /// `<base>.NNNNNN`, zero-based; with a ring size the counter wraps,
    /// bounding retention to the newest `ring` generations.
    Sequence { ring: Option<u32> },
    /// `<base>_NNNNNN_<YYYYmmdd-HHMMSS>`, the archive naming scheme.
    SequenceStamp,
}

impl Default for SuffixScheme {
    fn default() -> Self {
        Self::UnixStamp
    }
}

impl SuffixScheme {
    fn suffix(&self, generation: u64, stamp: DateTime<Utc>) -> String {
        match self {
            Self::UnixStamp => format!("-{}", stamp.timestamp()),
            Self::ClockTime => format!("-{}", stamp.format("%H%M%S")),
            Self::Sequence { ring } => {
                let seq = generation.saturating_sub(1);
                let seq = match ring {
                    Some(ring) if *ring > 0 => seq % u64::from(*ring),
                    _ => seq,
                };
                format!(".{seq:06}")
            }
            Self::SequenceStamp => {
                format!("_{:06}_{}", generation, stamp.format("%Y%m%d-%H%M%S"))
            }
        }
    }
}

/// Composes layout, basename, suffix scheme and extension into the
/// datadir-relative path of a generation.
#[derive(Debug, Clone)]
pub struct FileNamer {
    basename: String,
    layout: DirLayout,
    suffix: SuffixScheme,
    extension: String,
}

impl FileNamer {
    pub fn new(basename: impl Into<String>) -> Self {
        Self {
            basename: basename.into(),
            layout: DirLayout::default(),
            suffix: SuffixScheme::default(),
            extension: String::new(),
        }
    }

    pub fn with_layout(mut self, layout: DirLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_suffix(mut self, suffix: SuffixScheme) -> Self {
        self.suffix = suffix;
        self
    }

    /// Extension appended verbatim; include the leading dot.
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn relative_path(&self, generation: u64, stamp: DateTime<Utc>) -> PathBuf {
        let mut path = self.layout.bucket(stamp);
        path.push(format!(
            "{}{}{}",
            self.basename,
            self.suffix.suffix(generation, stamp),
            self.extension
        ));
        path
    }
}

impl StagePath for FileNamer {
    fn next_path(&mut self, generation: u64, stamp: DateTime<Utc>) -> io::Result<PathBuf> {
        Ok(self.relative_path(generation, stamp))
    }
}

#[cfg(test)]
#[path = "naming_test.rs"]
mod naming_test;
