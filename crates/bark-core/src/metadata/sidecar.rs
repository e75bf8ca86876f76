//! Sidecar metadata files.
//!
//! Every dataset, entry, and root keeps its attributes in a companion
//! document whose path is derived from the primary path by appending
//! [`SIDECAR_SUFFIX`]:
//!
//! ```text
//! experiment/              # root directory
//! experiment.meta          # root attributes
//! experiment/day1/         # entry directory
//! experiment/day1.meta     # entry attributes (uuid, timestamp, ...)
//! experiment/day1/mic.dat       # sampled payload
//! experiment/day1/mic.dat.meta  # dataset attributes
//! ```
//!
//! The document is a pretty-printed JSON object. Saves are atomic
//! (write-then-rename), so a reader never observes a half-written sidecar.

use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde_json::Value;
use snafu::prelude::*;

use crate::{
    metadata::MetaMap,
    storage::{self, StorageError},
};

/// Suffix appended to a primary path to locate its sidecar.
pub const SIDECAR_SUFFIX: &str = ".meta";

/// Errors that can occur while loading or saving a sidecar.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SidecarError {
    /// Neither the primary path nor its sidecar exists.
    #[snafu(display("No dataset or sidecar found at {path}"))]
    NotFound {
        /// The primary path that was requested.
        path: String,
    },

    /// The primary path exists but has no sidecar.
    #[snafu(display("Sidecar missing for existing path: {sidecar}"))]
    MissingSidecar {
        /// Expected sidecar location.
        sidecar: String,
    },

    /// The sidecar could not be parsed as JSON.
    #[snafu(display("Malformed sidecar {sidecar}: {source}"))]
    Parse {
        /// Sidecar path.
        sidecar: String,
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// The sidecar parsed, but its top-level value is not an object.
    #[snafu(display("Sidecar {sidecar} must contain a JSON object, found {found}"))]
    NotAnObject {
        /// Sidecar path.
        sidecar: String,
        /// Kind of JSON value found instead.
        found: &'static str,
    },

    /// The mapping could not be serialized.
    #[snafu(display("Failed to serialize metadata for {sidecar}: {source}"))]
    Serialize {
        /// Sidecar path.
        sidecar: String,
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// Filesystem failure while reading or writing the sidecar.
    #[snafu(display("Storage error on sidecar: {source}"))]
    Storage {
        /// Underlying storage error.
        source: StorageError,
    },
}

impl SidecarError {
    /// Returns `true` when the payload or its sidecar is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            SidecarError::NotFound { .. } | SidecarError::MissingSidecar { .. }
        )
    }

    /// Returns `true` when an existing sidecar is malformed.
    pub fn is_parse(&self) -> bool {
        matches!(
            self,
            SidecarError::Parse { .. } | SidecarError::NotAnObject { .. }
        )
    }
}

/// Derive the sidecar path for a primary path.
pub fn sidecar_path(path: &Path) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(SIDECAR_SUFFIX);
    PathBuf::from(s)
}

/// Whether `path` names a sidecar file (by suffix only).
pub fn is_sidecar(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.len() > SIDECAR_SUFFIX.len() && n.ends_with(SIDECAR_SUFFIX))
}

/// Inverse of [`sidecar_path`]: the primary path a sidecar belongs to.
pub fn primary_path(sidecar: &Path) -> Option<PathBuf> {
    if !is_sidecar(sidecar) {
        return None;
    }
    let s = sidecar.to_str()?;
    Some(PathBuf::from(&s[..s.len() - SIDECAR_SUFFIX.len()]))
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Parse sidecar text into a mapping.
pub(crate) fn parse(sidecar: &Path, text: &str) -> Result<MetaMap, SidecarError> {
    let value: Value = serde_json::from_str(text).context(ParseSnafu {
        sidecar: sidecar.display().to_string(),
    })?;
    match value {
        Value::Object(map) => Ok(map),
        other => NotAnObjectSnafu {
            sidecar: sidecar.display().to_string(),
            found: json_kind(&other),
        }
        .fail(),
    }
}

/// Load the metadata belonging to `path`.
///
/// # Errors
///
/// - [`SidecarError::NotFound`] if neither `path` nor its sidecar exists.
/// - [`SidecarError::MissingSidecar`] if `path` exists without a sidecar.
/// - [`SidecarError::Parse`] / [`SidecarError::NotAnObject`] if the sidecar
///   is malformed.
pub fn load(path: &Path) -> Result<MetaMap, SidecarError> {
    let sidecar = sidecar_path(path);
    match storage::read_to_string(&sidecar) {
        Ok(text) => parse(&sidecar, &text),
        Err(e) if e.is_not_found() => {
            if storage::exists(path).context(StorageSnafu)? {
                MissingSidecarSnafu {
                    sidecar: sidecar.display().to_string(),
                }
                .fail()
            } else {
                NotFoundSnafu {
                    path: path.display().to_string(),
                }
                .fail()
            }
        }
        Err(source) => Err(SidecarError::Storage { source }),
    }
}

/// Persist `meta` as the sidecar of `path`, replacing any existing one.
///
/// Parent directories are created as needed.
pub fn save(path: &Path, meta: &MetaMap) -> Result<(), SidecarError> {
    let sidecar = sidecar_path(path);
    let mut text = serde_json::to_string_pretty(meta).context(SerializeSnafu {
        sidecar: sidecar.display().to_string(),
    })?;
    text.push('\n');
    storage::write_atomic(&sidecar, text.as_bytes()).context(StorageSnafu)?;
    debug!("wrote sidecar {}", sidecar.display());
    Ok(())
}

/// Sidecars directly inside `dir` whose primary path no longer exists.
pub fn find_orphan_sidecars(dir: &Path) -> Result<Vec<PathBuf>, SidecarError> {
    let mut orphans = Vec::new();
    for child in storage::list_dir(dir).context(StorageSnafu)? {
        let Some(primary) = primary_path(&child) else {
            continue;
        };
        if !storage::exists(&primary).context(StorageSnafu)? {
            warn!("orphan sidecar without payload: {}", child.display());
            orphans.push(child);
        }
    }
    Ok(orphans)
}
