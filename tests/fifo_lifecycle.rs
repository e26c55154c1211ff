use std::fs;
use std::os::unix::fs::FileTypeExt;

use fifotty::fifo::{self, FifoError};
use tempfile::TempDir;

#[test]
fn creates_both_pipes_when_absent() {
    let dir = TempDir::new().expect("tempdir");
    let first = dir.path().join("pipe_in");
    let second = dir.path().join("pipe_out");

    fifo::create_all(&[&first, &second]).expect("create");

    for path in [&first, &second] {
        let meta = fs::metadata(path).expect("metadata");
        assert!(
            meta.file_type().is_fifo(),
            "{} should be a named pipe",
            path.display()
        );
    }
}

#[test]
fn reuses_an_existing_pipe() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("pipe");

    fifo::create_all(&[&path]).expect("first create");
    fifo::create_all(&[&path]).expect("second create");

    assert!(fs::metadata(&path).expect("metadata").file_type().is_fifo());
}

#[test]
fn conflicting_path_fails_and_rolls_back_the_partner() {
    let dir = TempDir::new().expect("tempdir");
    let fresh = dir.path().join("pipe_in");
    let conflict = dir.path().join("pipe_out");
    fs::write(&conflict, b"not a pipe").expect("write conflict file");

    let err = fifo::create_all(&[&fresh, &conflict]).expect_err("create should fail");
    match err {
        FifoError::Conflict { path } => assert_eq!(path, conflict),
        other => panic!("expected Conflict, got {other:?}"),
    }

    // The pipe created before the conflict was hit must be gone again.
    assert!(!fresh.exists(), "partial creation left behind");
    // The conflicting file itself is untouched.
    assert_eq!(fs::read(&conflict).expect("read conflict file"), b"not a pipe");
}

#[test]
fn create_failure_reports_the_source_error() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("missing").join("pipe");

    let err = fifo::create_all(&[&path]).expect_err("create should fail");
    assert!(matches!(err, FifoError::CreateFailed { .. }));
}

#[test]
fn removal_is_best_effort_and_skips_non_pipes() {
    let dir = TempDir::new().expect("tempdir");
    let pipe = dir.path().join("pipe");
    let file = dir.path().join("file");
    fifo::create_all(&[&pipe]).expect("create");
    fs::write(&file, b"keep me").expect("write file");

    fifo::remove_all(&[&pipe, &file, &dir.path().join("never_existed")]);

    assert!(!pipe.exists(), "pipe should be removed");
    assert!(file.exists(), "regular file must not be touched");
}
