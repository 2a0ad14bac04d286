//! Smoke tests wiring the rotation engine to the real factories.
//!
//! These exercise the full path: sink facade, trigger sources, rotation
//! controller, and on-disk artifacts produced by the stock factories.

use std::io::Read;
use std::path::Path;
use std::time::Duration;

use flate2::read::GzDecoder;
use roll_artifacts::{FileFactory, FileNamer, SuffixScheme, TarFactory, TarFramer};
use roll_engine::{RecordHeader, RollingSink, RotationOptions, StagedSink};
use tempfile::TempDir;
use tokio::time::sleep;

fn seq_namer(basename: &str, extension: &str) -> FileNamer {
    FileNamer::new(basename)
        .with_suffix(SuffixScheme::Sequence { ring: None })
        .with_extension(extension)
}

fn sorted_files(dir: &Path) -> Vec<(String, Vec<u8>)> {
    let mut files: Vec<(String, Vec<u8>)> = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            let data = std::fs::read(entry.path()).unwrap();
            (name, data)
        })
        .collect();
    files.sort();
    files
}

fn tar_entry_names(data: &[u8]) -> Vec<String> {
    let mut archive = tar::Archive::new(data);
    archive
        .entries()
        .unwrap()
        .map(|entry| {
            entry
                .unwrap()
                .path()
                .unwrap()
                .to_string_lossy()
                .into_owned()
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn size_capped_log_files_hold_every_byte() {
    let dir = TempDir::new().unwrap();
    let factory = FileFactory::new(dir.path(), seq_namer("app.log", "")).unwrap();
    let options = RotationOptions::default().with_max_size(10);
    let sink = RollingSink::open(factory, options).unwrap();

    for chunk in [&b"abcde"[..], b"fghij", b"kl"] {
        sink.write(chunk).await.unwrap();
        sleep(Duration::from_millis(5)).await;
    }
    sink.close().await.unwrap();

    assert_eq!(
        sorted_files(dir.path()),
        vec![
            ("app.log.000000".into(), b"abcdefghij".to_vec()),
            ("app.log.000001".into(), b"kl".to_vec()),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn count_capped_tar_archives_split_like_the_archiver() {
    let dir = TempDir::new().unwrap();
    let factory = TarFactory::new(dir.path(), seq_namer("backup", ".tar")).unwrap();
    let options = RotationOptions::default().with_max_count(2);
    let sink = RollingSink::open(factory, options).unwrap();

    for name in ["a.txt", "b.txt", "c.txt"] {
        let payload = name.as_bytes();
        sink.write_record(&RecordHeader::file(name, payload.len() as u64), payload)
            .await
            .unwrap();
        sleep(Duration::from_millis(5)).await;
    }
    sink.close().await.unwrap();

    let files = sorted_files(dir.path());
    assert_eq!(files.len(), 2);
    assert_eq!(tar_entry_names(&files[0].1), vec!["a.txt", "b.txt"]);
    assert_eq!(tar_entry_names(&files[1].1), vec!["c.txt"]);
}

#[tokio::test(start_paused = true)]
async fn gzipped_archives_survive_rotation_and_close() {
    let dir = TempDir::new().unwrap();
    let factory = TarFactory::new(dir.path(), seq_namer("backup", ".tar.gz"))
        .unwrap()
        .with_gzip(true);
    let sink = RollingSink::open(factory, RotationOptions::default()).unwrap();

    sink.write_record(&RecordHeader::file("one.txt", 3), b"one")
        .await
        .unwrap();
    sink.rotate();
    sleep(Duration::from_millis(1)).await;
    sink.write_record(&RecordHeader::file("two.txt", 3), b"two")
        .await
        .unwrap();
    sink.close().await.unwrap();

    let files = sorted_files(dir.path());
    assert_eq!(files.len(), 2);
    for (file, expected) in files.iter().zip(["one.txt", "two.txt"]) {
        let mut data = Vec::new();
        GzDecoder::new(&file.1[..]).read_to_end(&mut data).unwrap();
        assert_eq!(tar_entry_names(&data), vec![expected]);
    }
}

#[tokio::test(start_paused = true)]
async fn staged_tarballs_are_complete_single_pass_archives() {
    let dir = TempDir::new().unwrap();
    let namer = seq_namer("staged", ".tar");
    let options = RotationOptions::default().with_max_count(2);
    let sink = StagedSink::archive(dir.path(), namer, TarFramer, options).unwrap();

    for name in ["a.txt", "b.txt", "c.txt"] {
        let payload = name.as_bytes();
        sink.write_record(&RecordHeader::file(name, payload.len() as u64), payload)
            .await
            .unwrap();
        sleep(Duration::from_millis(5)).await;
    }
    sink.close().await.unwrap();

    let files = sorted_files(dir.path());
    assert_eq!(files.len(), 2);
    assert_eq!(tar_entry_names(&files[0].1), vec!["a.txt", "b.txt"]);
    assert_eq!(tar_entry_names(&files[1].1), vec!["c.txt"]);
}

#[tokio::test(start_paused = true)]
async fn interval_rotation_with_time_buckets_writes_nested_paths() {
    use roll_artifacts::DirLayout;

    let dir = TempDir::new().unwrap();
    let namer = FileNamer::new("app.log")
        .with_layout(DirLayout::TimeBuckets)
        .with_suffix(SuffixScheme::Sequence { ring: None });
    let factory = FileFactory::new(dir.path(), namer).unwrap();
    let sink = RollingSink::open(factory, RotationOptions::default()).unwrap();

    sink.write(b"bucketed\n").await.unwrap();
    sink.close().await.unwrap();

    let files = sorted_files(dir.path());
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].1, b"bucketed\n");
}
