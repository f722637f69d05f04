//! Tests for error types.

use super::*;

#[test]
fn test_error_display() {
    let err = Error::config("no roots configured");
    assert_eq!(err.to_string(), "configuration error: no roots configured");
}

#[test]
fn test_storage_error_not_found() {
    let err = StorageError::not_found("asset", "42");
    assert_eq!(err.to_string(), "not found: asset with id '42'");
}

#[test]
fn test_storage_error_conversion() {
    let storage_err = StorageError::Database("constraint failed".to_string());
    let err: Error = storage_err.into();
    assert!(matches!(err, Error::Storage(_)));
    assert!(!err.is_store_unavailable());
}

#[test]
fn test_unavailable_is_store_unavailable() {
    let err: Error = StorageError::Unavailable("database is locked".to_string()).into();
    assert!(err.is_store_unavailable());
}

#[test]
fn test_sqlite_busy_maps_to_unavailable() {
    let sqlite_err = rusqlite::Error::SqliteFailure(
        rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
        Some("database is locked".to_string()),
    );
    assert!(matches!(
        StorageError::from_sqlite(&sqlite_err),
        StorageError::Unavailable(_)
    ));
}

#[test]
fn test_sqlite_other_maps_to_database() {
    let err = StorageError::from(rusqlite::Error::QueryReturnedNoRows);
    assert!(matches!(err, StorageError::Database(_)));
}

#[test]
fn test_watcher_error_conversion() {
    let watch_err = WatcherError::WatchFailed {
        path: "/tmp/test".to_string(),
        reason: "permission denied".to_string(),
    };
    let err: Error = watch_err.into();
    assert!(matches!(err, Error::Watcher(_)));
}

#[test]
fn test_hash_error_from_io_kinds() {
    let path = Path::new("/data/report.pdf");

    let not_found = HashError::from_io(path, io::Error::new(io::ErrorKind::NotFound, "gone"));
    assert!(not_found.is_not_found());
    assert_eq!(not_found.path(), path);

    let denied = HashError::from_io(
        path,
        io::Error::new(io::ErrorKind::PermissionDenied, "nope"),
    );
    assert!(matches!(denied, HashError::PermissionDenied(_)));

    let other = HashError::from_io(path, io::Error::new(io::ErrorKind::Other, "disk"));
    assert!(matches!(other, HashError::Other { .. }));
    assert!(other.to_string().contains("report.pdf"));
}

#[test]
fn test_io_error_conversion() {
    let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
    let err: Error = io_err.into();
    assert!(matches!(err, Error::Io(_)));
}

#[test]
fn test_result_type_alias() {
    fn returns_ok() -> Result<i32> {
        Ok(42)
    }

    fn returns_err() -> Result<i32> {
        Err(Error::config("test error"))
    }

    assert!(returns_ok().is_ok());
    assert!(returns_err().is_err());
}

#[test]
fn test_error_debug_format() {
    let err = Error::Internal("something went wrong".to_string());
    let debug_str = format!("{err:?}");
    assert!(debug_str.contains("Internal"));
    assert!(debug_str.contains("something went wrong"));
}
