//! Roots: top-level experiment directories holding entries.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{debug, warn};
use snafu::prelude::*;

use crate::{
    container::{
        create_container_dir,
        entry::{Entry, create_entry, read_entry},
        error::*,
        require_dir,
    },
    metadata::{MetaMap, sidecar},
    storage,
};

/// An experiment directory and its entries in chronological order.
#[derive(Debug)]
pub struct Root {
    path: PathBuf,
    attrs: MetaMap,
    entries: Vec<Entry>,
}

impl Root {
    /// Directory of the root.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Free-form root attributes.
    pub fn attrs(&self) -> &MetaMap {
        &self.attrs
    }

    /// Mutable attributes. Persist with [`Root::save_attrs`].
    pub fn attrs_mut(&mut self) -> &mut MetaMap {
        &mut self.attrs
    }

    /// Persist the attributes to the root's sidecar.
    pub fn save_attrs(&self) -> ContainerResult<()> {
        sidecar::save(&self.path, &self.attrs).context(SidecarSnafu)
    }

    /// Entries sorted by timestamp. Ties keep directory-name order.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// An entry by directory name.
    pub fn entry(&self, name: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.name() == name)
    }

    /// An entry by directory name, mutably.
    pub fn entry_mut(&mut self, name: &str) -> Option<&mut Entry> {
        self.entries.iter_mut().find(|e| e.name() == name)
    }

    /// Create a new entry directory inside this root.
    ///
    /// The entry is inserted after every existing entry with the same or an
    /// earlier timestamp, keeping [`Root::entries`] sorted.
    pub fn create_entry(
        &mut self,
        name: &str,
        timestamp: DateTime<Utc>,
        attrs: MetaMap,
    ) -> ContainerResult<&mut Entry> {
        let entry = create_entry(self.path.join(name), timestamp, attrs)?;
        let at = self.entries.partition_point(|e| *e <= entry);
        self.entries.insert(at, entry);
        Ok(&mut self.entries[at])
    }
}

/// Create a root directory at `path` with the given attributes.
///
/// Fails with [`ContainerError::AlreadyExists`] if the directory or its
/// sidecar already exists, so two experiments are never merged silently.
pub fn create_root(path: impl AsRef<Path>, attrs: MetaMap) -> ContainerResult<Root> {
    let path = path.as_ref();
    create_container_dir(path)?;
    sidecar::save(path, &attrs).context(SidecarSnafu)?;
    debug!("created root {}", path.display());

    Ok(Root {
        path: path.to_path_buf(),
        attrs,
        entries: Vec::new(),
    })
}

/// Read a root and every entry under it.
///
/// Entries are the subdirectories that have a sidecar; other directories
/// are skipped with a warning.
pub fn read_root(path: impl AsRef<Path>) -> ContainerResult<Root> {
    let path = path.as_ref();
    require_dir(path)?;
    let attrs = sidecar::load(path).context(SidecarSnafu)?;

    let mut entries = Vec::new();
    for child in storage::list_dir(path).context(StorageSnafu)? {
        if !storage::is_dir(&child).context(StorageSnafu)? {
            continue;
        }
        if !storage::exists(&sidecar::sidecar_path(&child)).context(StorageSnafu)? {
            warn!("skipping {} without sidecar", child.display());
            continue;
        }
        entries.push(read_entry(&child)?);
    }
    entries.sort();

    debug!("read root {} with {} entries", path.display(), entries.len());
    Ok(Root {
        path: path.to_path_buf(),
        attrs,
        entries,
    })
}
