//! Error types and SNAFU context selectors for `dataset`.
//!
//! Variants fall into four classes that callers can branch on:
//!
//! - argument errors: the caller did not supply enough, or consistent,
//!   information to build a payload;
//! - lookup errors: a datatype code or name is not registered;
//! - not-found errors: the payload or its sidecar is missing;
//! - format errors: an existing payload or sidecar is corrupt or
//!   inconsistent with its recorded layout.

use arrow::error::ArrowError;
use snafu::prelude::*;

use crate::{
    dataset::{DatasetKind, dtype::Dtype},
    datatypes::{DataType, DataTypeError},
    metadata::sidecar::SidecarError,
    storage::StorageError,
};

/// Errors from reading, writing, and accessing datasets.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum DatasetError {
    /// Neither data nor a complete `(dtype, n_samples, n_channels)` hint was
    /// supplied, so the payload cannot be allocated.
    #[snafu(display("Cannot allocate sampled payload without data: missing {missing}"))]
    MissingPayloadShape {
        /// The first missing piece of shape information.
        missing: &'static str,
    },

    /// A parameter value is out of range or malformed.
    #[snafu(display("Invalid argument: {message}"))]
    InvalidArgument {
        /// Human-readable description.
        message: String,
    },

    /// Supplied data disagrees with an explicit shape or dtype parameter.
    #[snafu(display("Data {field} is {actual}, but parameters specify {expected}"))]
    ShapeMismatch {
        /// Which property disagrees (`dtype`, `n_channels`, `n_samples`).
        field: &'static str,
        /// Value in the parameters.
        expected: String,
        /// Value in the data.
        actual: String,
    },

    /// The datatype belongs to the other dataset kind.
    #[snafu(display(
        "Datatype {datatype} ({code}) cannot describe a {kind} dataset",
        code = datatype.code()
    ))]
    DatatypeKindMismatch {
        /// The offending datatype.
        datatype: DataType,
        /// The dataset kind being written or read.
        kind: DatasetKind,
    },

    /// An event table lacks one of the required columns.
    #[snafu(display("Event table is missing required column '{column}'"))]
    MissingColumn {
        /// Name of the missing column.
        column: String,
    },

    /// An event table column has a type that cannot be stored.
    #[snafu(display("Column '{column}' has unsupported type {data_type}"))]
    UnsupportedColumnType {
        /// Column name.
        column: String,
        /// Arrow type rendering, or the unknown tag.
        data_type: String,
    },

    /// Datatype registry lookup failed.
    #[snafu(display("Datatype lookup failed: {source}"))]
    Lookup {
        /// Underlying lookup error.
        source: DataTypeError,
    },

    /// The persisted datatype lies outside both known ranges.
    #[snafu(display("Unrecognized datatype code {code} in {path}"))]
    UnrecognizedDatatype {
        /// Dataset path.
        path: String,
        /// The unrecognized code.
        code: i64,
    },

    /// A required attribute is absent from the sidecar.
    #[snafu(display("Dataset {path} is missing attribute '{key}'"))]
    MissingAttr {
        /// Dataset path.
        path: String,
        /// Missing key.
        key: &'static str,
    },

    /// A sidecar attribute has the wrong type or value.
    #[snafu(display("Dataset {path} has invalid attribute '{key}': {message}"))]
    InvalidAttr {
        /// Dataset path.
        path: String,
        /// Offending key.
        key: &'static str,
        /// Human-readable description.
        message: String,
    },

    /// An element type tag could not be parsed.
    #[snafu(display("Unknown dtype '{tag}'"))]
    UnknownDtype {
        /// The unrecognized tag.
        tag: String,
    },

    /// The payload size does not match the recorded layout.
    #[snafu(display("Payload {path} is {actual} bytes, layout requires {expected}"))]
    PayloadSizeMismatch {
        /// Payload path.
        path: String,
        /// Size implied by the layout.
        expected: u64,
        /// Size found on disk.
        actual: u64,
    },

    /// The payload file does not exist.
    #[snafu(display("Payload file not found: {path}"))]
    PayloadNotFound {
        /// Payload path.
        path: String,
    },

    /// A write was attempted through a read-only mapping.
    #[snafu(display("Payload {path} is mapped read-only"))]
    ReadOnlyPayload {
        /// Payload path.
        path: String,
    },

    /// Typed access used a different element type than the payload.
    #[snafu(display("Payload holds {actual} samples, {requested} requested"))]
    DtypeMismatch {
        /// Element type of the payload.
        actual: Dtype,
        /// Element type requested by the caller.
        requested: Dtype,
    },

    /// A sample index lies outside the payload shape.
    #[snafu(display("Index ({row}, {col}) out of bounds for shape ({n_samples}, {n_channels})"))]
    IndexOutOfBounds {
        /// Requested row.
        row: usize,
        /// Requested column.
        col: usize,
        /// Number of rows.
        n_samples: usize,
        /// Number of columns.
        n_channels: usize,
    },

    /// Memory-mapping the payload failed.
    #[snafu(display("Failed to map payload {path}: {source}"))]
    Map {
        /// Payload path.
        path: String,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// Arrow failure while encoding or decoding an event table.
    #[snafu(display("Arrow error on event table {path}: {source}"))]
    Arrow {
        /// Payload path.
        path: String,
        /// Underlying Arrow error.
        source: ArrowError,
    },

    /// Sidecar load or save failed.
    #[snafu(display("{source}"))]
    Sidecar {
        /// Underlying sidecar error.
        source: SidecarError,
    },

    /// Filesystem failure on the payload.
    #[snafu(display("Storage error on dataset payload: {source}"))]
    Storage {
        /// Underlying storage error.
        source: StorageError,
    },
}

impl DatasetError {
    /// Returns `true` for errors caused by insufficient or inconsistent input.
    pub fn is_argument(&self) -> bool {
        matches!(
            self,
            DatasetError::MissingPayloadShape { .. }
                | DatasetError::InvalidArgument { .. }
                | DatasetError::ShapeMismatch { .. }
                | DatasetError::DatatypeKindMismatch { .. }
                | DatasetError::MissingColumn { .. }
                | DatasetError::UnsupportedColumnType { .. }
        )
    }

    /// Returns `true` for datatype registry lookup failures.
    pub fn is_lookup(&self) -> bool {
        matches!(self, DatasetError::Lookup { .. })
    }

    /// Returns `true` when the payload or its sidecar is missing.
    pub fn is_not_found(&self) -> bool {
        match self {
            DatasetError::PayloadNotFound { .. } => true,
            DatasetError::Sidecar { source } => source.is_not_found(),
            DatasetError::Storage { source } => source.is_not_found(),
            _ => false,
        }
    }

    /// Returns `true` for corrupt or inconsistent persisted state.
    pub fn is_format(&self) -> bool {
        match self {
            DatasetError::PayloadSizeMismatch { .. }
            | DatasetError::MissingAttr { .. }
            | DatasetError::InvalidAttr { .. }
            | DatasetError::UnknownDtype { .. }
            | DatasetError::UnrecognizedDatatype { .. } => true,
            DatasetError::Sidecar { source } => source.is_parse(),
            _ => false,
        }
    }
}

/// Result alias for dataset operations.
pub type DatasetResult<T> = Result<T, DatasetError>;
