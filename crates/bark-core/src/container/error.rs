//! Error types and SNAFU context selectors for `container`.

use snafu::prelude::*;

use crate::{dataset::DatasetError, metadata::sidecar::SidecarError, storage::StorageError};

/// Errors from creating, reading, and editing roots and entries.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ContainerError {
    /// A root or entry already exists at the target path.
    #[snafu(display("Container already exists: {path}"))]
    AlreadyExists {
        /// The target path.
        path: String,
    },

    /// The path exists but is not a directory, or does not exist.
    #[snafu(display("Not a container directory: {path}"))]
    NotADirectory {
        /// The offending path.
        path: String,
    },

    /// A stored timestamp could not be decoded.
    #[snafu(display("Invalid timestamp: {message}"))]
    InvalidTimestamp {
        /// Human-readable description.
        message: String,
    },

    /// The attribute is fixed at creation and cannot be changed.
    #[snafu(display("Attribute '{key}' cannot be changed after creation"))]
    ImmutableAttr {
        /// The protected key.
        key: String,
    },

    /// An entry sidecar lacks a required attribute.
    #[snafu(display("Entry {path} is missing attribute '{key}'"))]
    MissingAttr {
        /// Entry path.
        path: String,
        /// Missing key.
        key: &'static str,
    },

    /// An entry sidecar attribute has the wrong form.
    #[snafu(display("Entry {path} has invalid attribute '{key}': {message}"))]
    InvalidAttr {
        /// Entry path.
        path: String,
        /// Offending key.
        key: &'static str,
        /// Human-readable description.
        message: String,
    },

    /// Reading a dataset inside an entry failed.
    #[snafu(display("{source}"))]
    Dataset {
        /// Underlying dataset error.
        source: DatasetError,
    },

    /// Sidecar load or save failed.
    #[snafu(display("{source}"))]
    Sidecar {
        /// Underlying sidecar error.
        source: SidecarError,
    },

    /// Filesystem failure on the container directory.
    #[snafu(display("Storage error on container: {source}"))]
    Storage {
        /// Underlying storage error.
        source: StorageError,
    },
}

impl ContainerError {
    /// Returns `true` when creation failed because the target exists.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, ContainerError::AlreadyExists { .. })
    }

    /// Returns `true` when the container or one of its files is missing.
    pub fn is_not_found(&self) -> bool {
        match self {
            ContainerError::NotADirectory { .. } => true,
            ContainerError::Sidecar { source } => source.is_not_found(),
            ContainerError::Dataset { source } => source.is_not_found(),
            ContainerError::Storage { source } => source.is_not_found(),
            _ => false,
        }
    }
}

/// Result alias for container operations.
pub type ContainerResult<T> = Result<T, ContainerError>;
