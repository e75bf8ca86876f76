//! Roots and entries: the directory hierarchy that groups datasets.
//!
//! A root is an experiment directory with free-form attributes. Each entry is
//! a subdirectory identified by a generated `uuid` and ordered by its
//! `timestamp`; its datasets are the files inside it. Both kinds of
//! container keep their sidecar beside the directory (`root.meta` next to
//! `root/`), so a directory listing of the container never sees its own
//! metadata.

pub mod entry;
pub mod error;
pub mod root;
pub mod timestamp;

pub use entry::{Entry, create_entry, read_entry};
pub use error::{ContainerError, ContainerResult};
pub use root::{Root, create_root, read_root};
pub use timestamp::{datetime_to_timestamp, timestamp_to_datetime};

use std::path::Path;

use snafu::prelude::*;

use crate::{metadata::sidecar, storage};
use error::*;

/// Create a fresh container directory.
///
/// Fails with [`ContainerError::AlreadyExists`] if the directory or its
/// sidecar is already present.
pub(crate) fn create_container_dir(path: &Path) -> ContainerResult<()> {
    let sidecar = sidecar::sidecar_path(path);
    ensure!(
        !storage::exists(&sidecar).context(StorageSnafu)?,
        AlreadyExistsSnafu {
            path: path.display().to_string(),
        }
    );
    storage::create_dir_new(path).map_err(|e| {
        if e.is_already_exists() {
            ContainerError::AlreadyExists {
                path: path.display().to_string(),
            }
        } else {
            ContainerError::Storage { source: e }
        }
    })
}

/// Fail unless `path` is an existing directory.
pub(crate) fn require_dir(path: &Path) -> ContainerResult<()> {
    ensure!(
        storage::is_dir(path).context(StorageSnafu)?,
        NotADirectorySnafu {
            path: path.display().to_string(),
        }
    );
    Ok(())
}
