//! PID file lifecycle tests: create, duplicate detection, removal.

use std::fs;

use docklens_daemon::lifecycle::{remove_pid_file, write_pid_file};
use tempfile::TempDir;

#[test]
fn test_pid_file_contains_current_pid() {
    // Given: A temp directory for PID file
    let temp_dir = TempDir::new().expect("should create temp dir");
    let pid_path = temp_dir.path().join("docklens.pid");

    // When: Writing PID file
    write_pid_file(&pid_path).expect("should write PID file");

    // Then: File holds this process's PID
    let content = fs::read_to_string(&pid_path).expect("should read PID file");
    assert_eq!(content.trim(), std::process::id().to_string());
}

#[test]
fn test_pid_file_creates_parent_directory() {
    // Given: A path whose parent does not exist
    let temp_dir = TempDir::new().expect("should create temp dir");
    let pid_path = temp_dir.path().join("run").join("nested").join("docklens.pid");

    // When: Writing PID file
    let result = write_pid_file(&pid_path);

    // Then: Parent directories are created
    assert!(result.is_ok(), "should create parent directories: {result:?}");
    assert!(pid_path.exists());
}

#[test]
fn test_pid_file_rejects_second_instance() {
    // Given: A PID file left by another instance
    let temp_dir = TempDir::new().expect("should create temp dir");
    let pid_path = temp_dir.path().join("docklens.pid");
    fs::write(&pid_path, "4242\n").expect("should write PID file");

    // When: Writing PID file again
    let err = write_pid_file(&pid_path).expect_err("duplicate should fail");

    // Then: Error names the existing PID and the file is untouched
    assert!(err.to_string().contains("4242"), "got: {err}");
    assert_eq!(fs::read_to_string(&pid_path).unwrap(), "4242\n");
}

#[cfg(unix)]
#[test]
fn test_pid_file_permissions() {
    use std::os::unix::fs::PermissionsExt;

    // Given / When: A freshly written PID file
    let temp_dir = TempDir::new().expect("should create temp dir");
    let pid_path = temp_dir.path().join("docklens.pid");
    write_pid_file(&pid_path).expect("should write PID file");

    // Then: Only the owner can read or write it
    let mode = fs::metadata(&pid_path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[test]
fn test_remove_pid_file() {
    // Given: A written PID file
    let temp_dir = TempDir::new().expect("should create temp dir");
    let pid_path = temp_dir.path().join("docklens.pid");
    write_pid_file(&pid_path).expect("should write PID file");

    // When: Removing it
    remove_pid_file(&pid_path);

    // Then: It is gone and a new instance may start
    assert!(!pid_path.exists());
    assert!(write_pid_file(&pid_path).is_ok());
}

#[test]
fn test_remove_missing_pid_file_does_not_panic() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    remove_pid_file(&temp_dir.path().join("never-written.pid"));
}
