//! Tests for tar archive artifacts.

use std::io::{Read, Write};

use bytes::BytesMut;
use chrono::{TimeZone, Utc};
use flate2::read::GzDecoder;
use roll_engine::{ArchiveFormat, ArtifactKind, NextFactory, RecordFramer, RecordHeader};
use tempfile::TempDir;

use crate::archive::{TarFactory, TarFramer};
use crate::naming::{FileNamer, SuffixScheme};

fn stamp() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 2, 1, 13, 5, 9).unwrap()
}

fn tar_namer(gzip: bool) -> FileNamer {
    FileNamer::new("backup")
        .with_suffix(SuffixScheme::Sequence { ring: None })
        .with_extension(if gzip { ".tar.gz" } else { ".tar" })
}

fn record(name: &str, uid: u64) -> RecordHeader {
    RecordHeader {
        name: name.into(),
        size: 0,
        mode: 0o640,
        uid,
        gid: 100,
        mtime: Some(stamp()),
    }
}

fn read_entries(data: &[u8]) -> Vec<(String, Vec<u8>, u64)> {
    let mut archive = tar::Archive::new(data);
    archive
        .entries()
        .unwrap()
        .map(|entry| {
            let mut entry = entry.unwrap();
            let name = entry.path().unwrap().to_string_lossy().into_owned();
            let uid = entry.header().uid().unwrap();
            let mut contents = Vec::new();
            entry.read_to_end(&mut contents).unwrap();
            (name, contents, uid)
        })
        .collect()
}

#[test]
fn records_round_trip_through_a_tar_archive() {
    let dir = TempDir::new().unwrap();
    let mut factory = TarFactory::new(dir.path(), tar_namer(false)).unwrap();

    let mut artifact = factory.create(1, stamp()).unwrap();
    assert_eq!(artifact.kind(), ArtifactKind::Archive(ArchiveFormat::Tar));

    artifact
        .writer_mut()
        .write_record(&record("a.txt", 1000), b"alpha")
        .unwrap();
    artifact
        .writer_mut()
        .write_record(&record("sub/b.txt", 1001), b"beta")
        .unwrap();
    artifact.close().unwrap();

    let data = std::fs::read(dir.path().join("backup.000000.tar")).unwrap();
    let entries = read_entries(&data);
    assert_eq!(
        entries,
        vec![
            ("a.txt".into(), b"alpha".to_vec(), 1000),
            ("sub/b.txt".into(), b"beta".to_vec(), 1001),
        ]
    );
}

#[test]
fn gzip_wrapping_closes_every_layer() {
    let dir = TempDir::new().unwrap();
    let mut factory = TarFactory::new(dir.path(), tar_namer(true))
        .unwrap()
        .with_gzip(true);

    let mut artifact = factory.create(1, stamp()).unwrap();
    artifact
        .writer_mut()
        .write_record(&record("z.txt", 1000), b"zipped")
        .unwrap();
    artifact.close().unwrap();

    let compressed = std::fs::read(dir.path().join("backup.000000.tar.gz")).unwrap();
    let mut data = Vec::new();
    GzDecoder::new(&compressed[..])
        .read_to_end(&mut data)
        .expect("gzip frame was finalised");

    let entries = read_entries(&data);
    assert_eq!(entries, vec![("z.txt".into(), b"zipped".to_vec(), 1000)]);
}

#[test]
fn raw_writes_land_on_the_archive_stream() {
    let dir = TempDir::new().unwrap();
    let mut factory = TarFactory::new(dir.path(), tar_namer(false)).unwrap();

    let mut artifact = factory.create(1, stamp()).unwrap();
    artifact.writer_mut().write_all(b"RAWBYTES").unwrap();
    artifact.close().unwrap();

    let data = std::fs::read(dir.path().join("backup.000000.tar")).unwrap();
    assert!(data.starts_with(b"RAWBYTES"));
}

#[test]
fn framer_builds_a_readable_archive_in_memory() {
    let mut framer = TarFramer;
    let mut staged = BytesMut::new();

    framer
        .frame(&record("one.txt", 1000), b"first record", &mut staged)
        .unwrap();
    framer
        .frame(&record("two.txt", 1000), b"second", &mut staged)
        .unwrap();
    framer.finish(&mut staged).unwrap();

    assert_eq!(staged.len() % 512, 0, "tar streams are block aligned");

    let entries = read_entries(&staged);
    assert_eq!(
        entries,
        vec![
            ("one.txt".into(), b"first record".to_vec(), 1000),
            ("two.txt".into(), b"second".to_vec(), 1000),
        ]
    );
}

#[test]
fn framer_defaults_missing_mtime_to_now() {
    let mut framer = TarFramer;
    let mut staged = BytesMut::new();
    let header = RecordHeader::file("now.txt", 2);

    framer.frame(&header, b"ok", &mut staged).unwrap();
    framer.finish(&mut staged).unwrap();

    let mut archive = tar::Archive::new(&staged[..]);
    let entry = archive.entries().unwrap().next().unwrap().unwrap();
    assert!(entry.header().mtime().unwrap() > 0);
}

#[test]
fn missing_datadir_is_rejected_up_front() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("absent");
    let err = TarFactory::new(&missing, tar_namer(false)).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
}
