/// File sink behaviour: atomic rename, superseded transfers, hostile names.
mod common;

use common::{data, meta};
use slipxfer::transfer::sink::SAFE_NAME_MAX;
use slipxfer::transfer::{FileSink, Progress, Receiver, RejectReason, Sink, SinkError};

fn part_files(dir: &std::path::Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n.ends_with(".part"))
        .collect()
}

#[test]
fn completed_transfer_is_renamed_into_place() {
    let tmp = tempfile::tempdir().unwrap();
    let mut rx = Receiver::new(FileSink::new(tmp.path(), 1024));
    rx.on_meta(&meta(1, 4, "photo.bmp")).unwrap();
    assert!(!tmp.path().join("photo.bmp").exists());
    assert_eq!(part_files(tmp.path()).len(), 1);

    rx.on_data(&data(1, 0, b"ab")).unwrap();
    let progress = rx.on_data(&data(1, 1, b"cd")).unwrap();

    let Progress::Complete(done) = progress else {
        panic!("expected completion, got {:?}", progress);
    };
    let path = done.location.expect("file sink reports a location");
    assert_eq!(path, tmp.path().join("photo.bmp"));
    assert_eq!(std::fs::read(&path).unwrap(), b"abcd");
    assert!(part_files(tmp.path()).is_empty());
}

#[test]
fn superseded_transfer_leaves_no_partial_file() {
    let tmp = tempfile::tempdir().unwrap();
    let mut rx = Receiver::new(FileSink::new(tmp.path(), 1024));
    rx.on_meta(&meta(1, 8, "first.bin")).unwrap();
    rx.on_data(&data(1, 0, b"1234")).unwrap();
    rx.on_meta(&meta(2, 2, "second.bin")).unwrap();
    rx.on_data(&data(2, 0, b"ok")).unwrap();

    assert!(!tmp.path().join("first.bin").exists());
    assert_eq!(std::fs::read(tmp.path().join("second.bin")).unwrap(), b"ok");
    assert!(part_files(tmp.path()).is_empty());
}

#[test]
fn dropping_sink_discards_partial_file() {
    let tmp = tempfile::tempdir().unwrap();
    {
        let mut sink = FileSink::new(tmp.path(), 16);
        sink.begin(3, "half.bin", 4).unwrap();
        sink.write(0, b"xy").unwrap();
        assert!(sink.part_path().is_some_and(|p| p.exists()));
    }
    assert!(part_files(tmp.path()).is_empty());
    assert!(!tmp.path().join("half.bin").exists());
}

#[test]
fn traversal_names_stay_inside_output_dir() {
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("out");
    let mut rx = Receiver::new(FileSink::new(&out, 64));
    rx.on_meta(&meta(0x2a, 1, "../escape.txt")).unwrap();
    let Progress::Complete(done) = rx.on_data(&data(0x2a, 0, b"z")).unwrap() else {
        panic!("single-byte transfer should complete");
    };
    let path = done.location.unwrap();
    assert_eq!(path.parent().unwrap(), out.as_path());
    assert!(!tmp.path().join("escape.txt").exists());

    rx.on_meta(&meta(0x2b, 1, "..")).unwrap();
    rx.on_data(&data(0x2b, 0, b"z")).unwrap();
    assert!(out.join("transfer-0000002b.bin").exists());
}

#[test]
fn longest_wire_names_are_truncated_not_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let mut rx = Receiver::new(FileSink::new(tmp.path(), 64));
    for (file_id, name) in [(1, "a".repeat(255)), (2, "한".repeat(30)), (3, "é".repeat(127))] {
        rx.on_meta(&meta(file_id, 1, &name))
            .unwrap_or_else(|e| panic!("{}-byte name rejected: {}", name.len(), e));
        let Progress::Complete(done) = rx.on_data(&data(file_id, 0, b"k")).unwrap() else {
            panic!("single-byte transfer should complete");
        };
        let path = done.location.unwrap();
        assert!(path.file_name().unwrap().len() <= SAFE_NAME_MAX);
        assert_eq!(std::fs::read(&path).unwrap(), b"k");
    }
    assert!(part_files(tmp.path()).is_empty());
}

#[test]
fn sink_write_beyond_capacity_is_refused() {
    let tmp = tempfile::tempdir().unwrap();
    let mut sink = FileSink::new(tmp.path(), 2);
    sink.begin(1, "a", 2).unwrap();
    assert!(matches!(
        sink.write(0, b"abc"),
        Err(SinkError::Capacity { offset: 0, len: 3, capacity: 2 })
    ));
}

#[test]
fn unwritable_output_dir_fails_meta_and_clears_session() {
    let tmp = tempfile::tempdir().unwrap();
    let blocker = tmp.path().join("not-a-dir");
    std::fs::write(&blocker, b"").unwrap();
    let mut rx = Receiver::new(FileSink::new(&blocker, 64));
    let err = rx.on_meta(&meta(1, 1, "a")).unwrap_err();
    assert!(matches!(err, RejectReason::Storage(_)));
    assert!(err.is_fatal());
    assert!(rx.session().is_none());
    assert!(matches!(
        rx.on_data(&data(1, 0, b"a")),
        Err(RejectReason::NoActiveSession)
    ));
}
