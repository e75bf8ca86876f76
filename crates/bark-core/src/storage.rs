//! Local filesystem helpers.
//!
//! This module centralizes the raw file and directory operations used by
//! the sidecar store, the dataset payload writers, and the container layer.
//! Every helper maps `std::io::Error` into a [`StorageError`] that carries
//! the offending path, so higher layers can attach their own context without
//! re-deriving it.
//!
//! Only the local filesystem is supported. All operations are synchronous.

use snafu::{IntoError, prelude::*};
use std::{
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

/// Result alias for storage helpers.
pub type StorageResult<T> = Result<T, StorageError>;

/// A filesystem operation failed, classified by what the caller can do
/// about it.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StorageError {
    /// Nothing exists at the path.
    #[snafu(display("Path not found: {path}"))]
    NotFound {
        /// The missing path.
        path: String,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// Something already exists where a new file or directory was requested.
    #[snafu(display("Path already exists: {path}"))]
    AlreadyExists {
        /// The occupied path.
        path: String,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// Any other I/O failure.
    #[snafu(display("I/O error at {path}: {source}"))]
    OtherIo {
        /// The path being accessed.
        path: String,
        /// Underlying I/O error.
        source: io::Error,
    },
}

impl StorageError {
    /// Returns `true` if the error reports a missing path.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }

    /// Returns `true` if the error reports a path that already exists.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, StorageError::AlreadyExists { .. })
    }
}

/// Classify an I/O error by kind and attach the path it happened at.
pub(crate) fn io_error(path: &Path, e: io::Error) -> StorageError {
    let path = path.display().to_string();
    match e.kind() {
        io::ErrorKind::NotFound => NotFoundSnafu { path }.into_error(e),
        io::ErrorKind::AlreadyExists => AlreadyExistsSnafu { path }.into_error(e),
        _ => OtherIoSnafu { path }.into_error(e),
    }
}

fn create_parent_dir(abs: &Path) -> StorageResult<()> {
    if let Some(parent) = abs.parent() {
        if parent.as_os_str().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
    }
    Ok(())
}

/// Removes the temporary file of an unfinished atomic write.
struct TempFileGuard {
    path: PathBuf,
    armed: bool,
}

impl TempFileGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    /// Keep the file; call after the rename succeeds.
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if self.armed {
            // The caller is already returning the original error.
            let _ = fs::remove_file(&self.path);
        }
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(".tmp");
    PathBuf::from(s)
}

/// Write `contents` to `path` using a write-then-rename sequence.
///
/// Parent directories are created as needed. The payload is written to a
/// temporary file next to the target, synced, and renamed into place, so any
/// existing file at `path` is replaced in a single step.
pub fn write_atomic(path: &Path, contents: &[u8]) -> StorageResult<()> {
    create_parent_dir(path)?;

    let tmp_path = tmp_path_for(path);
    let mut guard = TempFileGuard::new(tmp_path.clone());

    {
        let mut file = File::create(&tmp_path).map_err(|e| io_error(&tmp_path, e))?;
        file.write_all(contents).map_err(|e| io_error(&tmp_path, e))?;
        file.sync_all().map_err(|e| io_error(&tmp_path, e))?;
    }

    fs::rename(&tmp_path, path).map_err(|e| io_error(path, e))?;

    guard.disarm();
    Ok(())
}

/// Read the file at `path` into a `String`.
///
/// A missing file yields [`StorageError::NotFound`].
pub fn read_to_string(path: &Path) -> StorageResult<String> {
    fs::read_to_string(path).map_err(|e| io_error(path, e))
}

/// Returns whether anything exists at `path`.
///
/// Only a `NotFound` answer maps to `false`; permission problems and other
/// failures are reported as errors.
pub fn exists(path: &Path) -> StorageResult<bool> {
    match fs::metadata(path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(io_error(path, e)),
    }
}

/// Returns whether `path` is an existing regular file.
pub fn is_file(path: &Path) -> StorageResult<bool> {
    match fs::metadata(path) {
        Ok(m) => Ok(m.is_file()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(io_error(path, e)),
    }
}

/// Returns whether `path` is an existing directory.
pub fn is_dir(path: &Path) -> StorageResult<bool> {
    match fs::metadata(path) {
        Ok(m) => Ok(m.is_dir()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(io_error(path, e)),
    }
}

/// Create a *new* directory at `path`, creating missing parents.
///
/// Fails with [`StorageError::AlreadyExists`] if `path` already exists,
/// whether as a directory or as a file.
pub fn create_dir_new(path: &Path) -> StorageResult<()> {
    create_parent_dir(path)?;
    fs::create_dir(path).map_err(|e| io_error(path, e))
}

/// Create (or truncate) a file for reading and writing, creating parents.
pub fn create_truncate(path: &Path) -> StorageResult<File> {
    create_parent_dir(path)?;
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .map_err(|e| io_error(path, e))
}

/// Open an existing file, read-only or read-write.
pub fn open_existing(path: &Path, writable: bool) -> StorageResult<File> {
    OpenOptions::new()
        .read(true)
        .write(writable)
        .open(path)
        .map_err(|e| io_error(path, e))
}

/// Length in bytes of an open file.
pub fn file_len(file: &File, path: &Path) -> StorageResult<u64> {
    file.metadata()
        .map(|m| m.len())
        .map_err(|e| io_error(path, e))
}

/// Set the length of an open file, zero-filling any extension.
pub fn set_len(file: &File, path: &Path, len: u64) -> StorageResult<()> {
    file.set_len(len).map_err(|e| io_error(path, e))
}

/// Remove a single file.
pub fn remove_file(path: &Path) -> StorageResult<()> {
    fs::remove_file(path).map_err(|e| io_error(path, e))
}

/// List the entries of a directory in file-name order.
pub fn list_dir(path: &Path) -> StorageResult<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(path).map_err(|e| io_error(path, e))? {
        let entry = entry.map_err(|e| io_error(path, e))?;
        out.push(entry.path());
    }
    out.sort();
    Ok(out)
}
