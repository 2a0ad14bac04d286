//! Tests for the plain file factory.

use std::io::Write;

use chrono::{TimeZone, Utc};
use roll_engine::NextFactory;
use tempfile::TempDir;

use crate::file::FileFactory;
use crate::naming::{DirLayout, FileNamer, SuffixScheme};

fn stamp() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 2, 1, 13, 5, 9).unwrap()
}

fn seq_namer(basename: &str) -> FileNamer {
    FileNamer::new(basename).with_suffix(SuffixScheme::Sequence { ring: None })
}

#[test]
fn creates_and_flushes_a_generation_file() {
    let dir = TempDir::new().unwrap();
    let mut factory = FileFactory::new(dir.path(), seq_namer("log")).unwrap();

    let mut artifact = factory.create(1, stamp()).unwrap();
    artifact.writer_mut().write_all(b"first line\n").unwrap();
    let path = artifact.path().unwrap().to_path_buf();
    artifact.close().unwrap();

    assert_eq!(path, dir.path().join("log.000000"));
    assert_eq!(std::fs::read(&path).unwrap(), b"first line\n");
}

#[test]
fn reopening_the_same_name_appends() {
    let dir = TempDir::new().unwrap();
    let namer = FileNamer::new("fixed").with_suffix(SuffixScheme::Sequence { ring: Some(1) });
    let mut factory = FileFactory::new(dir.path(), namer).unwrap();

    for chunk in [&b"one"[..], b"two"] {
        let mut artifact = factory.create(1, stamp()).unwrap();
        artifact.writer_mut().write_all(chunk).unwrap();
        artifact.close().unwrap();
    }

    assert_eq!(
        std::fs::read(dir.path().join("fixed.000000")).unwrap(),
        b"onetwo"
    );
}

#[test]
fn time_bucket_layout_creates_subdirectories() {
    let dir = TempDir::new().unwrap();
    let namer = seq_namer("log").with_layout(DirLayout::TimeBuckets);
    let mut factory = FileFactory::new(dir.path(), namer).unwrap();

    let mut artifact = factory.create(1, stamp()).unwrap();
    artifact.writer_mut().write_all(b"bucketed").unwrap();
    artifact.close().unwrap();

    let path = dir.path().join("2025/032/13/log.000000");
    assert_eq!(std::fs::read(path).unwrap(), b"bucketed");
}

#[test]
fn missing_datadir_is_rejected_up_front() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("absent");
    let err = FileFactory::new(&missing, seq_namer("log")).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
}
